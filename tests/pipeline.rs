use anyhow::Result;
use image::{Rgb, RgbImage};

use railway_vision::report::{csv_string, hazard_distribution, map_points};
use railway_vision::{
    analyze_and_save, shared_memory_uri, AnalyzeRequest, Analyzer, BackendRegistry, BoundingBox,
    Detection, DetectionMode, Direction, HazardLevel, LogStore, SignalColor, SqliteLogStore,
    StaticCaptioner, StubBackend,
};

/// 60x30 scene with a lit red lamp in the top-left 20x20 square.
fn crossing_scene() -> RgbImage {
    RgbImage::from_fn(60, 30, |x, y| {
        if x < 20 && y < 20 {
            Rgb([240, 30, 20])
        } else {
            Rgb([70, 70, 70])
        }
    })
}

fn analyzer() -> Analyzer {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::closed_vocabulary(vec![
        Detection::new("traffic_light", 0.91, BoundingBox::new(0, 0, 20, 20)),
        Detection::new("vehicle_on_track", 0.77, BoundingBox::new(25, 5, 58, 28)),
    ]));
    registry.register(StubBackend::open_vocabulary(
        vec![
            Detection::new("rail", 0.6, BoundingBox::new(0, 20, 60, 30)),
            Detection::new("shopping cart", 0.4, BoundingBox::new(30, 10, 40, 20)),
        ],
        vec!["rail".to_string(), "rock".to_string()],
    ));
    Analyzer::new(
        registry,
        Box::new(StaticCaptioner::new("a car stopped on a level crossing")),
    )
}

#[test]
fn both_modes_persist_to_a_shared_log() -> Result<()> {
    let uri = shared_memory_uri();
    let mut writer = SqliteLogStore::open(&uri)?;
    let mut reader = SqliteLogStore::open(&uri)?;
    let mut analyzer = analyzer();
    let image = crossing_scene();

    let local = analyze_and_save(
        &mut analyzer,
        &mut writer,
        &image,
        &AnalyzeRequest {
            latitude: 48.2,
            longitude: 16.37,
            ..AnalyzeRequest::new("crossing.jpg", DetectionMode::Local)
        },
    )?;
    assert_eq!(local.result.signal_color, SignalColor::Red);
    assert_eq!(local.result.hazard_level, HazardLevel::High);
    assert_eq!(local.result.direction, Direction::Straight);
    assert!(local.alert);

    let remote = analyze_and_save(
        &mut analyzer,
        &mut writer,
        &image,
        &AnalyzeRequest::new("crossing.jpg", DetectionMode::OpenVocab),
    )?;
    assert_eq!(remote.result.signal_color, SignalColor::Unknown);
    assert_eq!(remote.result.direction, Direction::Unknown);
    assert_eq!(remote.result.hazard_level, HazardLevel::High);
    assert_eq!(
        remote.result.summary,
        "YOLO-World Detected 2 objects. Unknowns: 1\nVLM says: a car stopped on a level crossing"
    );

    let rows = reader.list_all()?;
    assert_eq!(rows.len(), 2);
    // same-second timestamps fall back to newest id first
    assert!(rows[0].id > rows[1].id);
    assert_eq!(rows[1].latitude, Some(48.2));
    assert_eq!(rows[0].latitude, Some(0.0));

    assert_eq!(hazard_distribution(&rows), vec![(HazardLevel::High, 2)]);
    assert_eq!(map_points(&rows).len(), 2);
    let csv = csv_string(&rows)?;
    assert_eq!(csv.matches("\r\n").count(), 3);

    reader.close()?;
    writer.close()?;
    Ok(())
}

#[test]
fn separate_stores_do_not_share_rows() -> Result<()> {
    let mut first = SqliteLogStore::open(&shared_memory_uri())?;
    let mut second = SqliteLogStore::open(&shared_memory_uri())?;
    let mut analyzer = analyzer();

    analyze_and_save(
        &mut analyzer,
        &mut first,
        &crossing_scene(),
        &AnalyzeRequest::new("one.jpg", DetectionMode::Local),
    )?;
    assert_eq!(first.list_all()?.len(), 1);
    assert!(second.list_all()?.is_empty());
    Ok(())
}

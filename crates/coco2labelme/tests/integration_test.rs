use std::path::PathBuf;

use coco2labelme::{labelme, Converter, Document, Error, Params, RuleTable, ScoredPolygon};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(params: Params) -> Converter {
    Converter::from_files(
        &fixtures_dir().join("template.json"),
        &fixtures_dir().join("detections.json"),
        params,
    )
    .expect("Failed to load fixtures")
}

fn bounds(shape: &ScoredPolygon) -> [i32; 4] {
    let xs = shape.points.iter().map(|p| p[0]);
    let ys = shape.points.iter().map(|p| p[1]);
    [
        xs.clone().min().unwrap(),
        ys.clone().min().unwrap(),
        xs.max().unwrap(),
        ys.max().unwrap(),
    ]
}

#[test]
fn test_load_inputs() {
    let conv = load(Params::default());
    assert_eq!(conv.dataset.images.len(), 3);
    assert_eq!(conv.dataset.categories.len(), 3);
    assert_eq!(conv.detections.len(), 5);
    assert_eq!(conv.get_cat(2).unwrap().name, "洋室");
    // Image 3 has no detections and produces no output.
    assert_eq!(conv.image_ids(), vec![1, 2]);
}

#[test]
fn test_compressed_square() {
    let conv = load(Params::default());
    let result = conv.convert_image(1).unwrap();
    assert_eq!(result.dropped, 0);
    assert_eq!(result.shapes.len(), 1);

    let shape = &result.shapes[0];
    assert_eq!(shape.label, "LDK");
    assert_eq!(shape.group_id, 0);
    assert_eq!(shape.score, 0.9);
    // Pixels 5..=14 on both axes, outlined on their edges.
    assert_eq!(bounds(shape), [5, 5, 15, 15]);
}

#[test]
fn test_floor_plan_suppression() {
    let conv = load(Params::default());
    let result = conv.convert_image(2).unwrap();
    assert_eq!(result.dropped, 1);

    let summary: Vec<(&str, usize, f64)> = result
        .shapes
        .iter()
        .map(|s| (s.label.as_str(), s.group_id, s.score))
        .collect();
    assert_eq!(summary, vec![("洋室", 1, 0.85), ("廊下", 2, 0.3)]);
}

#[test]
fn test_rule_file_disables_suppression() {
    let rules = RuleTable::from_json_file(&fixtures_dir().join("no_rules.json")).unwrap();
    assert!(rules.is_empty());
    let conv = load(Params::with_rules(rules));
    let result = conv.convert_image(2).unwrap();
    let labels: Vec<&str> = result.shapes.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["LDK", "洋室", "廊下"]);
}

#[test]
fn test_convert_all_matches_per_image() {
    let conv = load(Params::default());
    let all = conv.convert().unwrap();
    assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    for (&id, result) in &all {
        assert_eq!(result.shapes, conv.convert_image(id).unwrap().shapes);
    }
}

#[test]
fn test_write_labelme_documents() {
    let conv = load(Params::default());
    let out = tempfile::TempDir::new().unwrap();
    for result in conv.convert().unwrap().values() {
        let path = out.path().join(labelme::output_name(&result.image));
        Document::from_shapes(result).save(&path).unwrap();
    }

    let doc = Document::load(&out.path().join("plan_002.json")).unwrap();
    assert_eq!(doc.image_path, "plan_002.png");
    assert_eq!((doc.image_height, doc.image_width), (30, 30));
    assert_eq!(doc.image_data, None);
    assert_eq!(doc.shapes.len(), 2);
    assert_eq!(doc.shapes[0].label, "洋室");
    assert_eq!(doc.shapes[0].group_id, Some(1));
    assert!(doc.shapes.iter().all(|s| s.shape_type == "polygon"));
    assert!(out.path().join("plan_001.json").exists());
    assert!(!out.path().join("plan_003.json").exists());
}

#[test]
fn test_embed_image_bytes() {
    let images = tempfile::TempDir::new().unwrap();
    std::fs::write(images.path().join("plan_001.png"), b"\x89PNG").unwrap();

    let conv = load(Params::default());
    let doc = Document::from_shapes(&conv.convert_image(1).unwrap())
        .embed_image(images.path())
        .unwrap();
    assert_eq!(doc.image_data.as_deref(), Some(&b"\x89PNG"[..]));
}

#[test]
fn test_missing_input_file() {
    let err = Converter::from_files(
        &fixtures_dir().join("template.json"),
        &fixtures_dir().join("missing.json"),
        Params::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::Io { .. }));
}

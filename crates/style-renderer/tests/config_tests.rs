//! Loading style configuration from disk.

use std::io::Write;

use style_renderer::{StyleConfig, StyleError, StyleFactory, StyleKind};
use tempfile::NamedTempFile;
use test_utils::{NDVI_STYLE, TRUE_COLOUR_STYLE, WATER_CLASSES_STYLE};

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ============================================================================
// File formats
// ============================================================================

#[test]
fn test_load_json_file() {
    let json = format!(
        r#"{{"version": "1.0", "styles": {{"true_colour": {}, "ndvi": {}, "water": {}}}}}"#,
        TRUE_COLOUR_STYLE, NDVI_STYLE, WATER_CLASSES_STYLE
    );
    let file = write_temp(".json", &json);
    let config = StyleConfig::from_file(file.path()).unwrap();
    assert_eq!(config.styles.len(), 3);

    let report = StyleFactory::default().build_all(&config);
    assert!(report.is_complete());
    assert_eq!(report.styles["true_colour"].kind(), StyleKind::Linear);
    assert_eq!(report.styles["ndvi"].kind(), StyleKind::Ramp);
    assert_eq!(report.styles["water"].kind(), StyleKind::ValueMap);
}

#[test]
fn test_load_yaml_file() {
    let yaml = r##"
version: "1.0"
styles:
  rainfall:
    title: Rainfall
    index_function:
      function: single_band
      kwargs:
        band: precip
    mpl_ramp: Blues
    range: [0, 50]
    legend:
      units: mm
      ticks_every: 10
"##;
    let file = write_temp(".yaml", yaml);
    let config = StyleConfig::from_file(file.path()).unwrap();
    let doc = config.get_style("rainfall").unwrap();
    assert_eq!(doc.palette.as_deref(), Some("Blues"));

    let style = StyleFactory::default().build("rainfall", doc).unwrap();
    assert_eq!(style.kind(), StyleKind::Ramp);
    assert!(style.needed_bands().contains("precip"));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = StyleConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, StyleError::Io(_)));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let file = write_temp(".yml", "styles: [unclosed");
    assert!(matches!(
        StyleConfig::from_file(file.path()).unwrap_err(),
        StyleError::Parse(_)
    ));
}

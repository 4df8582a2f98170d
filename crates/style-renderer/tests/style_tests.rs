//! End-to-end tests for building and rendering styles.

use std::sync::Arc;

use style_renderer::{
    masks, BandIndex, DataType, Dataset, FlagPredicate, Mask, RasterShape, Style, StyleDocument,
    StyleError, StyleFactory, StyleKind,
};
use test_utils::{
    assert_approx_eq, bits, create_pq_values, create_reflectance_dataset, float_band, pq_dataset,
    row_bands, row_dataset, typed_band, NDVI_STYLE, PQ_BAND, TRUE_COLOUR_STYLE, WATER_CLASSES_STYLE,
};

fn build(json: &str) -> Style {
    let doc = StyleDocument::from_json(json).unwrap();
    StyleFactory::default().build("test", &doc).unwrap()
}

fn row_pixels(image: &style_renderer::RgbaRaster) -> Vec<[u8; 4]> {
    let shape = image.shape();
    (0..shape.width).map(|x| image.pixel(0, 0, x)).collect()
}

// ============================================================================
// Linear styles
// ============================================================================

#[test]
fn test_linear_compression_endpoints() {
    let style = build(
        r#"{
            "components": {"red": {"b": 1.0}, "green": {"b": 1.0}, "blue": {"b": 1.0}},
            "scale_range": [-3000, 3000]
        }"#,
    );
    let Style::Linear(linear) = &style else {
        panic!("expected a linear style");
    };

    let data = row_dataset("b", &[-3000.0, 0.0, 3000.0]);
    let red = linear
        .channel_values(style_renderer::Channel::Red, &data)
        .unwrap()
        .unwrap();
    assert_eq!(red.iter().copied().collect::<Vec<_>>(), vec![0.0, 127.5, 255.0]);

    let image = style.render(&data).unwrap();
    assert_eq!(
        row_pixels(&image),
        vec![[0, 0, 0, 255], [128, 128, 128, 255], [255, 255, 255, 255]]
    );
}

#[test]
fn test_linear_weighted_bands_and_nan() {
    let style = build(
        r#"{
            "components": {"red": {"a": 0.5, "b": 0.5}, "green": {"a": 1.0}, "blue": {"b": 1.0}},
            "scale_range": [0, 100]
        }"#,
    );
    let data = row_bands(&[("a", &[100.0, f64::NAN]), ("b", &[0.0, 50.0])]);
    let pixels = row_pixels(&style.render(&data).unwrap());
    assert_eq!(pixels[0], [128, 255, 0, 255]);
    assert_eq!(pixels[1][3], 0);
}

#[test]
fn test_linear_output_is_monotonic() {
    let style = build(
        r#"{"components": {"red": {"b": 1.0}, "green": {"b": 1.0}, "blue": {"b": 1.0}}, "scale_range": [0, 3000]}"#,
    );
    let values: Vec<f64> = (0..=40).map(|i| i as f64 * 100.0 - 500.0).collect();
    let image = style.render(&row_dataset("b", &values)).unwrap();
    let reds: Vec<u8> = row_pixels(&image).iter().map(|p| p[0]).collect();
    assert!(reds.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(reds.first(), Some(&0));
    assert_eq!(reds.last(), Some(&255));
}

#[test]
fn test_true_colour_with_cloud_mask() {
    let style = build(TRUE_COLOUR_STYLE);
    assert_eq!(style.kind(), StyleKind::Linear);
    assert!(!style.definition().auto_legend);

    let data = create_reflectance_dataset(4, 4);
    let shape = data.shape();
    let mut pq_values = vec![0.0; shape.pixel_count()];
    pq_values[5] = bits::CLOUD;
    pq_values[10] = bits::CLOUD + bits::WATER;
    let pq = pq_dataset(shape, pq_values);

    let image = style.transform(data, Some(&pq), None).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            let expected = if y * 4 + x == 5 || y * 4 + x == 10 { 0 } else { 255 };
            assert_eq!(image.pixel(0, y, x)[3], expected, "pixel ({}, {})", y, x);
        }
    }
}

// ============================================================================
// Value-map styles
// ============================================================================

#[test]
fn test_value_map_first_rule_wins() {
    let style = build(
        r##"{
            "value_map": {"cls": [
                {"title": "first", "abstract": "a", "values": [1], "color": "#111111"},
                {"title": "second", "abstract": "b", "values": [1], "color": "#FFFFFF"}
            ]}
        }"##,
    );
    let pixels = row_pixels(&style.render(&row_dataset("cls", &[1.0, 2.0])).unwrap());
    assert_eq!(pixels[0], [17, 17, 17, 255]);
    assert_eq!(pixels[1], [0, 0, 0, 0]);
}

#[test]
fn test_value_map_flag_rules() {
    let style = build(WATER_CLASSES_STYLE);
    assert_eq!(style.kind(), StyleKind::ValueMap);

    let shape = RasterShape::spatial(1, 5);
    let data = pq_dataset(
        shape,
        vec![
            bits::NODATA,
            bits::CLOUD,
            bits::WATER,
            0.0,
            bits::WATER + bits::NODATA,
        ],
    );
    let pixels = row_pixels(&style.render(&data).unwrap());
    assert_eq!(pixels[0], [0, 0, 0, 0]);
    assert_eq!(pixels[1], [0x70, 0x70, 0x70, 255]);
    assert_eq!(pixels[2], [0x4F, 0x81, 0xBD, 255]);
    assert_eq!(pixels[3], [0x96, 0x96, 0x6E, 255]);
    // withheld by the nodata mask rule even though the water bit is set
    assert_eq!(pixels[4], [0, 0, 0, 0]);
}

#[test]
fn test_value_map_rule_with_flags_and_values_rejected() {
    let doc = StyleDocument::from_json(
        r#"{"value_map": {"cls": [{"title": "t", "abstract": "a", "values": [1], "flags": {"cloud": true}, "color": "red"}]}}"#,
    )
    .unwrap();
    let err = StyleFactory::default().build("bad", &doc).unwrap_err();
    assert!(err.is_config_error());
}

// ============================================================================
// Ramp styles
// ============================================================================

#[test]
fn test_ramp_step_at_zero() {
    let style = build(
        r##"{
            "index_function": {"function": "single_band", "kwargs": {"band": "v"}},
            "color_ramp": [
                {"value": -0.0, "color": "#000080", "alpha": 0.0},
                {"value": 0.0, "color": "#000080", "alpha": 1.0}
            ]
        }"##,
    );
    let pixels = row_pixels(&style.render(&row_dataset("v", &[0.0, -1e-9, 5.0])).unwrap());
    assert_eq!(pixels[0], [0, 0, 0x80, 255]);
    assert_eq!(pixels[1][3], 0);
    assert_eq!(pixels[2], [0, 0, 0x80, 255]);
}

#[test]
fn test_ramp_interpolates_between_points() {
    let style = build(
        r##"{
            "index_function": {"function": "single_band", "kwargs": {"band": "v"}},
            "color_ramp": [
                {"value": 0.0, "color": "#000000"},
                {"value": 1.0, "color": "#FFFFFF"}
            ]
        }"##,
    );
    let pixels = row_pixels(
        &style
            .render(&row_dataset("v", &[0.0, 0.5, 1.0, 2.0, f64::NAN]))
            .unwrap(),
    );
    assert_eq!(pixels[0], [0, 0, 0, 255]);
    assert_eq!(pixels[1], [128, 128, 128, 255]);
    assert_eq!(pixels[2], [255, 255, 255, 255]);
    assert_eq!(pixels[3], [255, 255, 255, 255]);
    assert_eq!(pixels[4][3], 0);
}

#[test]
fn test_ndvi_style_with_aliases() {
    let index = BandIndex::new()
        .with_band("nbart_nir", ["nir"])
        .with_band("nbart_red", ["red"]);
    let factory = StyleFactory::new(Arc::new(index));
    let style = factory
        .build("ndvi", &StyleDocument::from_json(NDVI_STYLE).unwrap())
        .unwrap();

    let expected: Vec<&str> = vec!["nbart_nir", "nbart_red"];
    assert_eq!(style.needed_bands().iter().map(String::as_str).collect::<Vec<_>>(), expected);

    let data = row_bands(&[("nbart_nir", &[3.0, 1.0, 1.0]), ("nbart_red", &[1.0, 1.0, 3.0])]);
    let value = style.feature_info(&data, 0, 0, 0).unwrap().unwrap();
    assert_approx_eq!(value, 0.5, 1e-12);

    let pixels = row_pixels(&style.render(&data).unwrap());
    assert_eq!(pixels[1], [0x8F, 0x3F, 0x20, 255]);
    // negative NDVI falls below the transparent step
    assert_eq!(pixels[2][3], 0);
}

#[test]
fn test_feature_info_out_of_range() {
    let style = build(NDVI_STYLE);
    let data = row_bands(&[("nir", &[3.0]), ("red", &[1.0])]);
    assert!(matches!(
        style.feature_info(&data, 0, 0, 4).unwrap_err(),
        StyleError::ShapeMismatch { .. }
    ));
}

#[test]
fn test_multi_date_handler() {
    let style = build(
        r##"{
            "index_function": {"function": "single_band", "kwargs": {"band": "v"}},
            "range": [0, 1],
            "multi_date": [{
                "allowed_count_range": [2, 2],
                "aggregator_function": {"function": "multi_date_delta"},
                "color_ramp": [
                    {"value": -1.0, "color": "#FF0000"},
                    {"value": 1.0, "color": "#0000FF"}
                ]
            }]
        }"##,
    );

    let two = RasterShape::new(2, 1, 1);
    let data = Dataset::new(two)
        .with_band("v", float_band(two, vec![0.0, 1.0]))
        .unwrap();
    let image = style.render(&data).unwrap();
    assert_eq!(image.shape().times, 1);
    assert_eq!(image.pixel(0, 0, 0), [0, 0, 255, 255]);

    let three = RasterShape::new(3, 1, 1);
    let data = Dataset::new(three)
        .with_band("v", float_band(three, vec![0.0, 0.5, 1.0]))
        .unwrap();
    assert_eq!(style.render(&data).unwrap().shape().times, 3);
}

// ============================================================================
// Hybrid styles
// ============================================================================

const HYBRID_BASE: &str = r##""components": {"red": {"b": 1.0}, "green": {"b": 1.0}, "blue": {"b": 1.0}},
    "scale_range": [0, 100],
    "index_function": {"function": "single_band", "kwargs": {"band": "b"}},
    "color_ramp": [
        {"value": 0.0, "color": "#FF0000"},
        {"value": 100.0, "color": "#0000FF"}
    ]"##;

#[test]
fn test_hybrid_full_ratio_matches_linear() {
    let hybrid = build(&format!(r#"{{"component_ratio": 1.0, {}}}"#, HYBRID_BASE));
    let linear = build(&format!("{{{}}}", HYBRID_BASE));
    assert_eq!(hybrid.kind(), StyleKind::Hybrid);
    assert_eq!(linear.kind(), StyleKind::Linear);

    let data = row_dataset("b", &[0.0, 25.0, 50.0, 100.0]);
    assert_eq!(hybrid.render(&data).unwrap(), linear.render(&data).unwrap());
}

#[test]
fn test_hybrid_zero_ratio_matches_ramp() {
    let hybrid = build(&format!(r#"{{"component_ratio": 0.0, {}}}"#, HYBRID_BASE));
    let data = row_dataset("b", &[0.0, 50.0, 100.0]);
    let pixels = row_pixels(&hybrid.render(&data).unwrap());
    assert_eq!(pixels[0], [255, 0, 0, 255]);
    assert_eq!(pixels[1], [128, 0, 128, 255]);
    assert_eq!(pixels[2], [0, 0, 255, 255]);
}

#[test]
fn test_hybrid_ratio_out_of_range() {
    let doc = StyleDocument::from_json(&format!(r#"{{"component_ratio": 1.5, {}}}"#, HYBRID_BASE)).unwrap();
    assert!(StyleFactory::default().build("h", &doc).unwrap_err().is_config_error());
}

#[test]
fn test_hybrid_index_changing_time_axis_is_error() {
    let style = build(
        r##"{
            "component_ratio": 0.5,
            "components": {"red": {"v": 1.0}, "green": {"v": 1.0}, "blue": {"v": 1.0}},
            "scale_range": [0, 1],
            "index_function": {"function": "multi_date_delta", "kwargs": {"band": "v"}},
            "range": [-1, 1]
        }"##,
    );
    assert_eq!(style.kind(), StyleKind::Hybrid);

    let two = RasterShape::new(2, 1, 1);
    let data = Dataset::new(two)
        .with_band("v", float_band(two, vec![0.0, 1.0]))
        .unwrap();
    assert!(matches!(
        style.render(&data).unwrap_err(),
        StyleError::ShapeMismatch { .. }
    ));
}

// ============================================================================
// Masks
// ============================================================================

#[test]
fn test_masks_are_idempotent() {
    let shape = RasterShape::spatial(8, 8);
    let pq = pq_dataset(shape, create_pq_values(shape, 7));
    let data = Dataset::new(shape)
        .with_band("v", float_band(shape, (0..64).map(f64::from).collect()))
        .unwrap();
    let clear = [Mask::new(PQ_BAND, FlagPredicate::all([("cloud", false)]))];

    let once = masks::apply_masks(data, &clear, Some(&pq), None).unwrap();
    let twice = masks::apply_masks(once.clone(), &clear, Some(&pq), None).unwrap();

    let a = &once.require("v").unwrap().data;
    let b = &twice.require("v").unwrap().data;
    assert!(a.iter().zip(b.iter()).all(|(x, y)| x == y || (x.is_nan() && y.is_nan())));
    assert!(a.iter().any(|v| v.is_nan()));
}

#[test]
fn test_extent_applies_without_pq() {
    let shape = RasterShape::spatial(1, 3);
    let data = row_dataset("v", &[1.0, 2.0, 3.0]);
    let extent = ndarray::Array3::from_shape_vec(shape.dim(), vec![true, false, true]).unwrap();
    let masked = masks::apply_masks(data, &[], None, Some(&extent)).unwrap();
    let v = &masked.require("v").unwrap().data;
    assert_eq!(v[(0, 0, 0)], 1.0);
    assert!(v[(0, 0, 1)].is_nan());
}

#[test]
fn test_extent_then_pq_on_integer_band() {
    // pixel 0 clear, pixel 1 outside the extent, pixel 2 cloudy, pixel 3 both
    let shape = RasterShape::spatial(1, 4);
    let pq = pq_dataset(shape, vec![0.0, 0.0, bits::CLOUD, bits::CLOUD]);
    let data = Dataset::new(shape)
        .with_band(
            "v",
            typed_band(shape, vec![10.0, 20.0, 30.0, 40.0], DataType::Int16).with_nodata(-999.0),
        )
        .unwrap();
    let extent =
        ndarray::Array3::from_shape_vec(shape.dim(), vec![true, false, true, false]).unwrap();
    let clear = [Mask::new(PQ_BAND, FlagPredicate::all([("cloud", false)]))];

    let masked = masks::apply_masks(data, &clear, Some(&pq), Some(&extent)).unwrap();
    let band = masked.require("v").unwrap();
    assert_eq!(band.dtype, DataType::Float64);
    assert_eq!(band.data[(0, 0, 0)], 10.0);
    assert_eq!(band.data[(0, 0, 1)], -999.0);
    assert!(band.data[(0, 0, 2)].is_nan());
    assert!(band.data[(0, 0, 3)].is_nan());
}

// ============================================================================
// Factory
// ============================================================================

#[test]
fn test_components_take_precedence_over_value_map() {
    let style = build(
        r#"{
            "components": {"red": {"b": 1.0}, "green": {"b": 1.0}, "blue": {"b": 1.0}},
            "scale_range": [0, 1],
            "value_map": {"b": [{"title": "t", "abstract": "a", "values": [1], "color": "red"}]}
        }"#,
    );
    assert_eq!(style.kind(), StyleKind::Linear);
}

#[test]
fn test_ramp_without_index_function_is_config_error() {
    let doc = StyleDocument::from_json(r#"{"range": [0, 1]}"#).unwrap();
    let err = StyleFactory::default().build("r", &doc).unwrap_err();
    assert!(matches!(err, StyleError::Config { .. }));
}

#[test]
fn test_index_function_alone_matches_nothing() {
    let doc = StyleDocument::from_json(
        r#"{"index_function": {"function": "single_band", "kwargs": {"band": "v"}}}"#,
    )
    .unwrap();
    assert!(matches!(
        StyleFactory::default().build("r", &doc).unwrap_err(),
        StyleError::NoMatchingStrategy(_)
    ));
}

#[test]
fn test_unknown_alias_is_config_error() {
    let factory = StyleFactory::new(Arc::new(BandIndex::new().with_band("nbart_red", ["red"])));
    let doc = StyleDocument::from_json(NDVI_STYLE).unwrap();
    assert!(factory.build("ndvi", &doc).unwrap_err().is_config_error());
}

#[test]
fn test_needed_bands_cover_every_reference() {
    let style = build(
        r#"{
            "components": {"red": {"red": 1.0}, "green": {"function": "norm_diff", "kwargs": {"band1": "nir", "band2": "red"}, "scale_range": [-1, 1]}, "blue": {"blue": 1.0}},
            "scale_range": [0, 3000],
            "needed_bands": ["swir1"],
            "pq_masks": [{"band": "fmask", "flags": {"cloud": false}}]
        }"#,
    );
    let needed: Vec<&str> = style.needed_bands().iter().map(String::as_str).collect();
    assert_eq!(needed, vec!["blue", "fmask", "nir", "red", "swir1"]);
}

#[test]
fn test_build_all_reports_failures() {
    let config = style_renderer::StyleConfig::from_json(&format!(
        r#"{{"version": "1", "styles": {{"ndvi": {}, "broken": {{"title": "nothing"}}}}}}"#,
        NDVI_STYLE
    ))
    .unwrap();
    let report = StyleFactory::default().build_all(&config);
    assert!(report.styles.contains_key("ndvi"));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "broken");
    assert!(!report.is_complete());
}

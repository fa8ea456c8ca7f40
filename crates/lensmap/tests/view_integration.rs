//! Integration tests for camera views placed in the world
//!
//! Checks the views through their common interface: projection of world
//! points, FOV bookkeeping and the serializable summary.

use lensmap::{
    AnyCameraView, CameraFrame, CameraView, CameraViewSummary, EquidistantView,
    EquirectangularView, FovExtent, FovSpec, LensmapError, PinholeView, PolynomialFisheyeView,
    PolynomialSpec,
};
use nalgebra::{Vector2, Vector3};

mod test_utils;
use test_utils::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Camera at (2, -1, 0.5) looking along world +y, up is world +z.
fn forward_frame() -> CameraFrame {
    CameraFrame::new(
        [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]],
        [2.0, -1.0, 0.5],
    )
}

#[test]
fn test_pinhole_optical_axis_hits_principal_point() -> TestResult {
    let frame = forward_frame();
    let view = PinholeView::new(&FovSpec::symmetric([640, 480], 3.0, [90.0, 0.0]), frame)?;

    // 7 m straight ahead of the camera
    let ahead = Vector3::new(2.0, 6.0, 0.5);
    let (pixels, valid) = view.project_to_image(&[ahead]);
    assert!(valid[0]);
    assert!((pixels[0] - Vector2::new(320.0, 240.0)).norm() < 1e-9);

    // behind the camera
    let (_, valid) = view.project_to_image(&[Vector3::new(2.0, -8.0, 0.5)]);
    assert!(!valid[0]);
    Ok(())
}

#[test]
fn test_pinhole_world_round_trip() -> TestResult {
    let frame = forward_frame();
    let spec = FovSpec::new([800, 600], 2.0, FovExtent::Range([[-20.0, 40.0], [-10.0, 30.0]]));
    let view = PinholeView::new(&spec, frame)?;

    let pixels = [
        Vector2::new(0.5, 0.5),
        Vector2::new(400.0, 300.0),
        Vector2::new(123.25, 471.5),
        Vector2::new(799.25, 599.25),
    ];
    for (i, pixel) in pixels.iter().enumerate() {
        let ray = view.pixel_to_camera_ray(pixel);
        let local = ray * (2.0 + i as f64);
        let world = frame.points_to_world(&[local]);
        let (projected, valid) = view.project_to_image(&world);
        assert!(valid[0]);
        assert!((projected[0] - pixel).norm() < 1e-6, "{pixel:?} -> {:?}", projected[0]);
    }
    Ok(())
}

#[test]
fn test_equidistant_cone_is_in_front() -> TestResult {
    let view = EquidistantView::new(
        &FovSpec::symmetric([400, 300], 3.0, [180.0, 0.0]).with_fov_max(190.0),
        CameraFrame::default(),
    )?;
    let points = points_in_cone(200, 80.0);
    let projection = view.project_to_image_detailed(&points);
    assert!(projection.in_front.iter().all(|v| *v));

    let width = view.fov().pixel_count()[0];
    assert_eq!((view.pixel_count_max()[0] - width) % 2, 0);

    let crop = view.eval_crop();
    assert!(crop.left >= 0.0 && crop.right <= 1.0 && crop.left < crop.right);
    assert!(crop.bottom >= 0.0 && crop.top <= 1.0 && crop.bottom < crop.top);
    Ok(())
}

#[test]
fn test_zero_fov_is_rejected() {
    let spec = FovSpec::symmetric([640, 480], 3.0, [0.0, 0.0]);
    assert!(matches!(
        PinholeView::new(&spec, CameraFrame::default()),
        Err(LensmapError::InvalidConfig(_))
    ));
    assert!(matches!(
        EquidistantView::new(&spec, CameraFrame::default()),
        Err(LensmapError::InvalidConfig(_))
    ));
    assert!(matches!(
        EquirectangularView::new(&spec, CameraFrame::default()),
        Err(LensmapError::InvalidConfig(_))
    ));
}

#[test]
fn test_summaries_serialize_for_every_variant() -> TestResult {
    let spec = FovSpec::symmetric([320, 240], 3.0, [90.0, 0.0]);
    let polynomial = PolynomialSpec {
        pixel_count: [320, 240],
        pixel_size_um: 3.0,
        coefficients: vec![0.0, 2.0],
        center_offset_mm: [0.0, 0.0],
        fov_max_deg: None,
    };
    let lut_image = pinhole_lut(24, 32, [11.5, 15.5], 20.0);

    let views: Vec<AnyCameraView> = vec![
        PinholeView::new(&spec, forward_frame())?.into(),
        EquidistantView::new(&spec, CameraFrame::default())?.into(),
        EquirectangularView::new(&spec, CameraFrame::default())?.into(),
        PolynomialFisheyeView::from_coefficients(&polynomial, CameraFrame::default())?.into(),
        lensmap::LutView::from_image(&lut_image, &lensmap::LutConfig::new(), CameraFrame::default())?
            .into(),
    ];

    let summaries: Vec<CameraViewSummary> = views.iter().map(|v| v.summary()).collect();
    let json = serde_json::to_value(&summaries)?;
    let kinds: Vec<&str> = json
        .as_array()
        .ok_or("summaries must serialize to an array")?
        .iter()
        .filter_map(|s| s["details"]["kind"].as_str())
        .collect();
    assert_eq!(
        kinds,
        ["pinhole", "equidistant", "equirectangular", "polynomial_fisheye", "lut"]
    );
    assert_eq!(json[0]["origin_m"], serde_json::json!([2.0, -1.0, 0.5]));
    assert_eq!(json[4]["pixel_count"], serde_json::json!([32, 24]));

    let parsed: Vec<CameraViewSummary> = serde_json::from_value(json)?;
    assert_eq!(parsed.len(), views.len());
    assert_eq!(parsed[1].details, summaries[1].details);

    // every variant sees the first point, straight ahead of its camera
    let points = points_in_cone(20, 30.0);
    for view in &views {
        let projection = view.project_to_image_detailed(&points);
        assert_eq!(projection.pixels.len(), points.len());
        assert!(projection.in_front[0]);
    }
    Ok(())
}

use deferred::{backend::CascadeParams, cascade::CascadedShadowType, DeferredSettings};
use deferred_test::{Command, FrameRecord, TestRunner};
use deferred_types::{CameraProjection, LightAttrib};
use glam::Vec3A;

fn cascades(frame: &FrameRecord) -> Vec<&CascadeParams> {
    frame
        .commands
        .iter()
        .filter_map(|command| match command {
            Command::SetCascades(params) => Some(params),
            _ => None,
        })
        .collect()
}

fn assert_contiguous(params: &CascadeParams) {
    for pair in params.intervals.windows(2) {
        assert_eq!(pair[0].y, pair[1].x, "{params:?}");
    }
    for interval in &params.intervals {
        assert!(interval.x < interval.y, "{params:?}");
    }
}

#[test]
pub fn directional_shadow_splits_the_view_range() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.add_directional(LightAttrib::empty());
    let frame = runner.render_frame()?;

    let params = cascades(&frame);
    assert_eq!(params.len(), 1);
    let params = params[0];
    assert_eq!(params.shadow_type, CascadedShadowType::Pssm);
    assert_eq!(params.intervals.len(), 4);
    assert_eq!(params.intervals[0].x, 0.1);
    assert_eq!(params.intervals[3].y, 100.0);
    assert_contiguous(params);

    // Pssm never needs the depth range of the frame.
    assert!(!frame
        .commands
        .iter()
        .any(|command| matches!(command, Command::ReduceDepthBounds(_))));
    Ok(())
}

#[test]
pub fn viewport_cascade_count() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.add_directional(LightAttrib::empty());
    runner.set_viewport_cascades(2, 0.5)?;
    let frame = runner.render_frame()?;

    let params = cascades(&frame);
    assert_eq!(params[0].intervals.len(), 2);
    assert_contiguous(params[0]);
    Ok(())
}

#[test]
pub fn unshadowed_directional_light_has_no_cascades() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.add_directional(LightAttrib::NO_SHADOW);
    let frame = runner.render_frame()?;
    assert!(cascades(&frame).is_empty());
    Ok(())
}

#[test]
pub fn sdsm_fits_cascades_to_the_depth_bounds() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder()
        .settings(DeferredSettings {
            cascaded_shadow_type: CascadedShadowType::Sdsm,
            ..Default::default()
        })
        .build()?;
    runner.add_directional(LightAttrib::empty());
    let frame = runner.render_frame()?;

    let reductions = frame.count(|command| matches!(command, Command::ReduceDepthBounds(_)));
    assert_eq!(reductions, 1);

    let params = cascades(&frame);
    let params = params[0];
    assert_eq!(params.shadow_type, CascadedShadowType::Sdsm);
    assert_eq!(params.intervals[0].x, 1.0);
    assert_eq!(params.intervals[3].y, 50.0);
    assert_contiguous(params);
    Ok(())
}

#[test]
pub fn sdsm_bounds_are_clamped_to_the_camera() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.set_cascaded_shadow_type(CascadedShadowType::Sdsm);
    runner.add_directional(LightAttrib::empty());
    runner.backend_mut().depth_bounds = glam::Vec2::new(0.0, 1000.0);
    let frame = runner.render_frame()?;

    let params = cascades(&frame);
    assert_eq!(params[0].intervals[0].x, 0.1);
    assert_eq!(params[0].intervals[3].y, 100.0);
    Ok(())
}

#[test]
pub fn orthographic_viewer_gets_finite_cascades() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.scene.camera.projection = CameraProjection::Orthographic {
        size: Vec3A::new(20.0, 20.0, 200.0),
    };
    runner.add_directional(LightAttrib::empty());
    let frame = runner.render_frame()?;

    let params = cascades(&frame);
    let params = params[0];
    assert!(
        params.intervals.iter().all(|i| i.x.is_finite() && i.y.is_finite()),
        "{params:?}"
    );
    assert_eq!(params.intervals[0].x, 0.0);
    assert_eq!(params.intervals[3].y, 100.0);
    assert_contiguous(params);
    Ok(())
}

use deferred::{
    build_pass_list,
    builder::g_buffer_passes,
    managers::{CameraManager, LightManager},
    volume::LightVolumes,
    PassCode, PassListOptions, PassType,
};
use deferred_test::{decode_all, TestRunner};
use deferred_types::{
    Camera, DirectionalLight, Handedness, LightAttrib, LightKind, PointLight, SpotLight,
};
use glam::Vec3;

use PassType::*;

fn light(kind: u32, attrib: LightAttrib, seed: u32) -> LightKind {
    let position = Vec3::new(seed as f32, 2.0, -(seed as f32));
    match kind {
        0 => LightKind::Spot(SpotLight {
            attrib,
            color: Vec3::ONE,
            falloff: Vec3::X,
            position,
            direction: Vec3::NEG_Y,
            outer_angle: 0.7,
            inner_angle: 0.5,
        }),
        1 => LightKind::Point(PointLight {
            attrib,
            color: Vec3::ONE,
            falloff: Vec3::X,
            position,
        }),
        _ => LightKind::Directional(DirectionalLight {
            attrib,
            color: Vec3::ONE,
            falloff: Vec3::X,
            direction: Vec3::new(0.0, -1.0, 1.0).normalize(),
        }),
    }
}

/// Full pass list of a frame over `kinds`.
fn pass_list(kinds: &[LightKind], disabled: &[usize], options: PassListOptions) -> Vec<PassCode> {
    let mut manager = LightManager::new();
    for (i, kind) in kinds.iter().enumerate() {
        let handle = manager.add(kind.clone());
        if disabled.contains(&i) {
            manager.set_enabled(handle, false).unwrap();
        }
    }
    let camera = CameraManager::new(Camera::default(), Handedness::Left, Some(16.0 / 9.0));
    let lights = manager.snapshot(&camera).unwrap();

    let mut list = g_buffer_passes(options.mrt_g_buffer).to_vec();
    list.extend(build_pass_list(&lights, &LightVolumes::new(), options).passes);
    list
}

fn is_light_pass(ty: PassType) -> bool {
    !ty.is_g_buffer() && !ty.is_shading()
}

fn assert_ordered(list: &[PassCode]) {
    let first_light = list.iter().position(|c| !c.pass_type().is_g_buffer()).unwrap();
    assert_eq!(first_light, 2, "{list:?}");
    assert!(list[first_light..].iter().all(|c| !c.pass_type().is_g_buffer()), "{list:?}");

    let first_shading = list.iter().position(|c| c.pass_type().is_shading()).unwrap();
    assert!(list[first_shading..].iter().all(|c| c.pass_type().is_shading()), "{list:?}");
    assert!(list[..first_shading].iter().all(|c| !c.pass_type().is_shading()));

    for (i, code) in list.iter().enumerate() {
        if matches!(code.pass_type(), GenShadowMap | GenReflectiveShadowMap) {
            let consumed_before = list[..i].iter().any(|earlier| {
                matches!(earlier.pass_type(), Lighting | IndirectLighting) && earlier.light_index() == code.light_index()
            });
            assert!(!consumed_before, "{code:?} runs after its light was consumed in {list:?}");
        }
        if is_light_pass(code.pass_type()) {
            assert!(i > 1 && i < first_shading);
        }
    }
}

/// Cheap deterministic generator so the light mixes are reproducible.
struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0
    }
}

fn attrib(bits: u32) -> LightAttrib {
    let mut attrib = LightAttrib::empty();
    if bits & 1 != 0 {
        attrib |= LightAttrib::NO_SHADOW;
    }
    if bits & 2 != 0 {
        attrib |= LightAttrib::INDIRECT_LIGHTING;
    }
    attrib
}

#[test]
pub fn light_mixes_keep_pass_order() {
    let mut rng = XorShift(0x9E37_79B9);
    for case in 0..200 {
        let count = rng.next() % 6;
        let kinds: Vec<_> = (0..count).map(|i| light(rng.next() % 3, attrib(rng.next() % 4), i)).collect();
        let disabled: Vec<_> = (0..count as usize).filter(|_| rng.next() % 5 == 0).collect();
        let options = PassListOptions {
            mrt_g_buffer: case % 2 == 0,
            indirect_lighting: case % 3 == 0,
        };

        let list = pass_list(&kinds, &disabled, options);
        assert_ordered(&list);
        assert_eq!(list, pass_list(&kinds, &disabled, options), "pass lists differ between runs");
    }
}

#[test]
pub fn point_light_has_every_face() {
    let list = pass_list(
        &[light(1, LightAttrib::empty(), 0), light(1, LightAttrib::empty(), 1)],
        &[],
        PassListOptions::default(),
    );
    for light_index in [1, 2] {
        let faces: Vec<u32> = list
            .iter()
            .filter(|c| c.pass_type() == GenShadowMap && c.light_index() == light_index)
            .map(|c| c.index_in_pass())
            .collect();
        assert_eq!(faces, [0, 1, 2, 3, 4, 5]);

        let lighting: Vec<u32> = list
            .iter()
            .filter(|c| c.pass_type() == Lighting && c.light_index() == light_index)
            .map(|c| c.index_in_pass())
            .collect();
        assert_eq!(lighting, [6]);
    }
}

#[test]
pub fn disabled_lights_keep_their_index() {
    let list = pass_list(
        &[light(1, LightAttrib::NO_SHADOW, 0), light(2, LightAttrib::NO_SHADOW, 1)],
        &[0],
        PassListOptions::default(),
    );
    assert_eq!(
        decode_all(&list),
        [
            (GBuffer, 0, 0),
            (GBuffer, 0, 1),
            (Lighting, 0, 0),
            (Lighting, 2, 0),
            (Shading, 0, 0),
            (Shading, 0, 1)
        ]
    );
}

#[test]
pub fn removed_lights_close_their_gap() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    let point = runner.add_point(LightAttrib::NO_SHADOW);
    runner.add_spot(LightAttrib::empty());
    runner.remove_light(point)?;

    let frame = runner.render_frame()?;
    assert_eq!(
        frame.decoded_pass_list()[2..],
        [
            (Lighting, 0, 0),
            (GenShadowMap, 1, 0),
            (Lighting, 1, 0),
            (Shading, 0, 0),
            (Shading, 0, 1)
        ]
    );

    // A new light takes the freed slot, ahead of the spot light.
    runner.add_point(LightAttrib::NO_SHADOW);
    let frame = runner.render_frame()?;
    assert_eq!(
        frame.decoded_pass_list()[2..],
        [
            (Lighting, 0, 0),
            (Lighting, 1, 6),
            (GenShadowMap, 2, 0),
            (Lighting, 2, 0),
            (Shading, 0, 0),
            (Shading, 0, 1)
        ]
    );
    Ok(())
}

#[test]
pub fn ambient_only_frame() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    let frame = runner.render_frame()?;
    assert_eq!(
        frame.decoded_pass_list(),
        [
            (GBuffer, 0, 0),
            (GBuffer, 0, 1),
            (Lighting, 0, 0),
            (Shading, 0, 0),
            (Shading, 0, 1)
        ]
    );
    Ok(())
}

#[test]
pub fn shadowed_spot_light_frame() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.add_spot(LightAttrib::empty());
    let frame = runner.render_frame()?;
    assert_eq!(
        frame.decoded_pass_list()[2..],
        [
            (Lighting, 0, 0),
            (GenShadowMap, 1, 0),
            (Lighting, 1, 0),
            (Shading, 0, 0),
            (Shading, 0, 1)
        ]
    );
    Ok(())
}

#[test]
pub fn unshadowed_point_light_frame() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().build()?;
    runner.add_point(LightAttrib::NO_SHADOW);
    let frame = runner.render_frame()?;
    assert_eq!(
        frame.decoded_pass_list()[2..],
        [(Lighting, 0, 0), (Lighting, 1, 6), (Shading, 0, 0), (Shading, 0, 1)]
    );
    Ok(())
}

#[test]
pub fn every_frame_finishes_within_its_list() -> anyhow::Result<()> {
    let mut runner = TestRunner::builder().objects(3).build()?;
    runner.add_spot(LightAttrib::empty());
    runner.add_spot(LightAttrib::INDIRECT_LIGHTING);
    runner.add_point(LightAttrib::empty());
    runner.add_directional(LightAttrib::empty());
    runner.add_point(LightAttrib::NO_SHADOW | LightAttrib::INDIRECT_LIGHTING);

    for _ in 0..3 {
        let frame = runner.render_frame()?;
        assert_eq!(frame.results.len(), frame.pass_list.len());
        assert_eq!(frame.results.last().map(|(code, _)| *code), frame.pass_list.last().copied());
        assert_ordered(&frame.pass_list);
    }
    Ok(())
}

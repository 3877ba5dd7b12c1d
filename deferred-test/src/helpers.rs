use deferred::{backend::LightShaderParams, PassCode, PassType, PostProcess, Technique};
use deferred_types::{LightAttrib, LightHandle};
use glam::Vec3;

use crate::{Command, FrameRecord, TestRunner};

impl TestRunner {
    pub fn add_spot(&mut self, attrib: LightAttrib) -> LightHandle {
        self.layer.add_spot_light(
            attrib,
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::NEG_Y,
            0.6,
            0.4,
            Vec3::ONE,
            Vec3::new(1.0, 0.0, 0.0),
        )
    }

    pub fn add_point(&mut self, attrib: LightAttrib) -> LightHandle {
        self.layer
            .add_point_light(attrib, Vec3::new(0.0, 3.0, 0.0), Vec3::ONE, Vec3::new(1.0, 0.0, 0.0))
    }

    pub fn add_directional(&mut self, attrib: LightAttrib) -> LightHandle {
        self.layer
            .add_directional_light(attrib, Vec3::new(0.3, -1.0, 0.2), Vec3::ONE, Vec3::new(1.0, 0.0, 0.0))
    }
}

/// `(pass_type, light_index, index_in_pass)` of every code.
pub fn decode_all(codes: &[PassCode]) -> Vec<(PassType, u32, u32)> {
    codes.iter().map(|code| code.decode()).collect()
}

impl FrameRecord {
    pub fn decoded_pass_list(&self) -> Vec<(PassType, u32, u32)> {
        decode_all(&self.pass_list)
    }

    pub fn post_processes(&self) -> impl Iterator<Item = &PostProcess> {
        self.commands.iter().filter_map(|command| match command {
            Command::PostProcess(pp) => Some(pp),
            _ => None,
        })
    }

    pub fn renders(&self) -> impl Iterator<Item = Technique> + '_ {
        self.commands.iter().filter_map(|command| match command {
            Command::Render { technique, .. } => Some(*technique),
            _ => None,
        })
    }

    pub fn light_params(&self) -> impl Iterator<Item = &LightShaderParams> {
        self.commands.iter().filter_map(|command| match command {
            Command::SetLightParams(params) => Some(params),
            _ => None,
        })
    }

    pub fn count(&self, f: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|command| f(command)).count()
    }
}

use deferred::{
    pass::{MAX_INDEX_IN_PASS, MAX_LIGHT_INDEX},
    PassCode, PassType,
};

#[test]
pub fn decode_inverts_encode() {
    let lights = (0..=MAX_LIGHT_INDEX).step_by(13).chain([MAX_LIGHT_INDEX]);
    for bits in 0..8 {
        let ty = PassType::from_bits(bits).unwrap();
        for light in lights.clone() {
            for index in (0..=MAX_INDEX_IN_PASS).step_by(511).chain([MAX_INDEX_IN_PASS]) {
                let code = PassCode::encode(ty, light, index);
                assert_eq!(code.decode(), (ty, light, index), "{code:?}");
                assert_eq!(PassCode::from_raw(code.raw()), Some(code));
            }
        }
    }
}

#[test]
pub fn unknown_type_bits_are_rejected() {
    for bits in 8..16u32 {
        assert!(PassType::from_bits(bits).is_none());
        assert_eq!(PassCode::from_raw((bits << 28) | 0x0001_0006), None);
    }
}

#[test]
pub fn codes_sort_by_type_then_light() {
    let shadow = PassCode::encode(PassType::GenShadowMap, 9, 5);
    let lighting = PassCode::encode(PassType::Lighting, 1, 0);
    assert!(shadow.raw() < lighting.raw());
    assert_eq!(format!("{lighting:?}"), "Lighting@1,0");
}

use capone_wire::{Deserializable, Serializable};
use capone_wire::messages::*;

// ── Primitive round-trips ─────────────────────────────────────────────────────

#[test]
fn roundtrip_i32() {
    for v in [0i32, -1, i32::MAX, i32::MIN, 42] {
        let bytes = v.to_bytes();
        assert_eq!(i32::from_bytes(&bytes).unwrap(), v);
    }
}

#[test]
fn roundtrip_u32() {
    for v in [0u32, 1, u32::MAX, 0xdead_beef] {
        let bytes = v.to_bytes();
        assert_eq!(u32::from_bytes(&bytes).unwrap(), v);
    }
}

// ── String / bytes ────────────────────────────────────────────────────────────

#[test]
fn roundtrip_empty_string() {
    let s = String::new();
    let bytes = s.to_bytes();
    assert_eq!(String::from_bytes(&bytes).unwrap(), s);
}

#[test]
fn roundtrip_short_string() {
    let s = "hello world".to_owned();
    let bytes = s.to_bytes();
    assert_eq!(bytes.len() % 4, 0, "must be 4-byte aligned");
    assert_eq!(String::from_bytes(&bytes).unwrap(), s);
}

#[test]
fn roundtrip_long_bytes() {
    // >253 bytes triggers the 4-byte length header path
    let v: Vec<u8> = (0..300).map(|i| i as u8).collect();
    let bytes = v.clone().to_bytes();
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), v);
}

// ── Cursor EOF detection ──────────────────────────────────────────────────────

#[test]
fn deserialize_truncated_returns_eof() {
    use capone_wire::deserialize::Error;
    let result = i32::from_bytes(&[0x01, 0x02]); // only 2 bytes, need 4
    assert_eq!(result, Err(Error::UnexpectedEof));
}

#[test]
fn list_count_larger_than_buffer_is_rejected() {
    use capone_wire::deserialize::Error;
    // Claims 2^31 entries with no bytes behind the count
    let bytes = 0x8000_0000u32.to_bytes();
    assert_eq!(Vec::<u32>::from_bytes(&bytes), Err(Error::UnexpectedEof));
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[test]
fn roundtrip_command_envelope() {
    for command in [Command::Query, Command::Connect, Command::Request, Command::Terminate] {
        let msg = CommandEnvelope { command };
        assert_eq!(CommandEnvelope::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }
}

#[test]
fn command_envelope_rejects_unknown_verb() {
    use capone_wire::{Identifiable, deserialize::Error};
    let mut bytes = Vec::new();
    CommandEnvelope::CONSTRUCTOR_ID.serialize(&mut bytes);
    7u32.serialize(&mut bytes);
    assert_eq!(CommandEnvelope::from_bytes(&bytes), Err(Error::InvalidValue));
}

#[test]
fn roundtrip_session_key_message() {
    let msg = SessionKeyMessage {
        sign_pk:    core::array::from_fn(|i| i as u8),
        encrypt_pk: core::array::from_fn(|i| (i * 2) as u8),
        signature:  core::array::from_fn(|i| (i * 3) as u8),
    };
    assert_eq!(SessionKeyMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
}

#[test]
fn roundtrip_capability_message() {
    let msg = CapabilityMessage {
        secret: [7u8; 32],
        chain:  vec![
            CapabilityEntry { identity: [1u8; 32], rights: 0x3 },
            CapabilityEntry { identity: [2u8; 32], rights: 0x1 },
        ],
    };
    assert_eq!(CapabilityMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
}

#[test]
fn roundtrip_session_announcement() {
    let msg = SessionAnnouncement {
        identifier: 0xcafe_f00d,
        cap: CapabilityMessage { secret: [9u8; 32], chain: vec![] },
    };
    assert_eq!(SessionAnnouncement::from_bytes(&msg.to_bytes()).unwrap(), msg);
}

#[test]
fn roundtrip_service_description() {
    let msg = ServiceDescription {
        name:     "White noise".into(),
        category: "Shell".into(),
        kind:     "exec".into(),
        version:  "0.1.0".into(),
        location: "Living room".into(),
        port:     "43217".into(),
    };
    assert_eq!(ServiceDescription::from_bytes(&msg.to_bytes()).unwrap(), msg);
}

#[test]
fn roundtrip_exec_params() {
    let msg = ExecParams {
        command:   "cat".into(),
        arguments: vec!["/etc/hostname".into()],
    };
    assert_eq!(ExecParams::from_bytes(&msg.to_bytes()).unwrap(), msg);
}

#[test]
fn messages_are_distinguished_by_constructor() {
    use capone_wire::deserialize::Error;
    let start = SessionStart {
        identifier: 1,
        cap: CapabilityMessage { secret: [0u8; 32], chain: vec![] },
    };
    let err = SessionTermination::from_bytes(&start.to_bytes()).unwrap_err();
    assert!(matches!(err, Error::UnexpectedConstructor { .. }));
}

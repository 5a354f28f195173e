use wivrn_crypto::{DhKeypair, Secrets, Smp};

mod helpers {
    use super::*;

    pub struct Pair {
        pub server: DhKeypair,
        pub headset: DhKeypair,
    }

    pub fn generate_x25519_pair() -> Pair {
        Pair {
            server: DhKeypair::generate_x25519(),
            headset: DhKeypair::generate_x25519(),
        }
    }
}

#[test]
fn both_sides_derive_identical_session_secrets() {
    let pair = helpers::generate_x25519_pair();
    let dh_server = pair
        .server
        .diffie_hellman(&pair.headset.public_key_bytes())
        .unwrap();
    let dh_headset = pair
        .headset
        .diffie_hellman(&pair.server.public_key_bytes())
        .unwrap();
    assert_eq!(dh_server, dh_headset);

    let server_secrets = Secrets::derive(&dh_server).unwrap();
    let headset_secrets = Secrets::derive(&dh_headset).unwrap();

    assert_eq!(server_secrets.control_key, headset_secrets.control_key);
    assert_eq!(server_secrets.stream_key, headset_secrets.stream_key);
    assert_eq!(
        server_secrets.control_iv_to_headset,
        headset_secrets.control_iv_to_headset
    );
}

#[test]
fn pairing_with_matching_pin_then_derives_secrets() {
    let pin = "482913";
    let mut server_smp = Smp::new();
    let mut headset_smp = Smp::new();

    let msg1 = headset_smp.step1(pin);
    let msg2 = server_smp.step2(&msg1, pin).unwrap();
    let msg3 = headset_smp.step3(&msg2).unwrap();
    let (msg4, server_matched) = server_smp.step4(&msg3).unwrap();
    let headset_matched = headset_smp.step5(&msg4).unwrap();

    assert!(server_matched && headset_matched);

    let pair = helpers::generate_x25519_pair();
    let dh = pair
        .server
        .diffie_hellman(&pair.headset.public_key_bytes())
        .unwrap();
    let secrets = Secrets::derive(&dh).unwrap();
    assert_eq!(secrets.control_key.len(), 16);
}

#[test]
fn pairing_with_wrong_pin_on_one_side_fails_for_both() {
    let mut server_smp = Smp::new();
    let mut headset_smp = Smp::new();

    let msg1 = headset_smp.step1("111111");
    let msg2 = server_smp.step2(&msg1, "222222").unwrap();
    let msg3 = headset_smp.step3(&msg2).unwrap();
    let (msg4, server_matched) = server_smp.step4(&msg3).unwrap();
    let headset_matched = headset_smp.step5(&msg4).unwrap();

    assert!(!server_matched);
    assert!(!headset_matched);
}

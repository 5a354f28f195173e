//! Socialist-millionaire PAKE over the fixed 1536-bit safe prime.
//!
//! Ported from `examples/original_source/common/smp.h`/`smp.cpp`, itself a
//! port of libotr's SM protocol: four exchanged messages (`msg1..msg4`),
//! each carrying Schnorr-style zero-knowledge proofs so neither side ever
//! learns anything about a mismatched secret beyond the fact that it
//! mismatched. The secret compared here is the 6-digit pairing PIN shown on
//! both screens.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, Result};

/// The 1536-bit safe prime modulus, identical to the one in `smp.h`.
fn modulus() -> BigUint {
    BigUint::parse_bytes(
        concat!(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
            "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
            "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
            "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
            "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
            "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
            "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
            "670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
        )
        .as_bytes(),
        16,
    )
    .expect("static modulus literal is valid hex")
}

/// The order of the prime-order subgroup, q = (p-1)/2.
fn order() -> BigUint {
    BigUint::parse_bytes(
        concat!(
            "7FFFFFFFFFFFFFFFE487ED5110B4611A62633145C06E0E68",
            "948127044533E63A0105DF531D89CD9128A5043CC71A026E",
            "F7CA8CD9E69D218D98158536F92F8A1BA7F09AB6B6A8E122",
            "F242DABB312F3F637A262174D31BF6B585FFAE5B7A035BF6",
            "F71C35FDAD44CFD2D74F9208BE258FF324943328F6722D9E",
            "E1003E5C50B1DF82CC6D241B0E2AE9CD348B1FD47E9267AF",
            "C1B2AE91EE51D6CB0E3179AB1042A95DCF6A9483B84B4B36",
            "B3861AA7255E4C0278BA36046511B993FFFFFFFFFFFFFFFF",
        )
        .as_bytes(),
        16,
    )
    .expect("static order literal is valid hex")
}

fn generator() -> BigUint {
    BigUint::from(2u32)
}

fn random_exponent(q: &BigUint) -> BigUint {
    let bytes = (q.bits() as usize).div_ceil(8);
    loop {
        let mut buf = vec![0u8; bytes];
        rand::thread_rng().fill_bytes(&mut buf);
        let candidate = BigUint::from_bytes_be(&buf) % q;
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

fn mod_pow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

fn mod_inverse(value: &BigUint, modulus: &BigUint) -> BigUint {
    // Fermat's little theorem; `modulus()` is prime.
    value.modpow(&(modulus - BigUint::from(2u32)), modulus)
}

/// Hashes a version tag plus a list of group elements into an exponent mod
/// `q`, the Fiat-Shamir challenge used by every proof below.
fn challenge(version: u8, elements: &[&BigUint]) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    for e in elements {
        hasher.update(e.to_bytes_be());
    }
    let digest = hasher.finalize();
    BigUint::from_bytes_be(&digest) % order()
}

/// Maps the pairing PIN to an exponent mod `q`.
fn secret_to_exponent(secret: &str) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update(b"wivrn-smp-secret");
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    BigUint::from_bytes_be(&digest) % order()
}

fn mod_sub(a: &BigUint, b: &BigUint, q: &BigUint) -> BigUint {
    let a = a % q;
    let b = b % q;
    if a >= b {
        a - b
    } else {
        (a + q) - b
    }
}

/// Schnorr proof of knowledge of `x` such that `g^x == g_x`.
fn prove_know_log(g: &BigUint, x: &BigUint, version: u8, p: &BigUint, q: &BigUint) -> (BigUint, BigUint) {
    let r = random_exponent(q);
    let gr = mod_pow(g, &r, p);
    let c = challenge(version, &[&gr]);
    let d = mod_sub(&r, &((x * &c) % q), q);
    (c, d)
}

fn check_know_log(c: &BigUint, d: &BigUint, g: &BigUint, g_x: &BigUint, version: u8, p: &BigUint) -> bool {
    let lhs = (mod_pow(g, d, p) * mod_pow(g_x, c, p)) % p;
    challenge(version, &[&lhs]) == *c
}

/// Proof of knowledge of `(r, y)` such that `big_p == g3^r` and
/// `big_q == g1^r * g2^y`, used for Bob's and Alice's `(P, Q)` pairs.
fn prove_equal_coords(
    g1: &BigUint,
    g2: &BigUint,
    g3: &BigUint,
    r: &BigUint,
    y: &BigUint,
    version: u8,
    p: &BigUint,
    q: &BigUint,
) -> (BigUint, BigUint, BigUint) {
    let r1 = random_exponent(q);
    let r2 = random_exponent(q);
    let t1 = mod_pow(g3, &r1, p);
    let t2 = (mod_pow(g1, &r1, p) * mod_pow(g2, &r2, p)) % p;
    let c = challenge(version, &[&t1, &t2]);
    let d1 = mod_sub(&r1, &((r * &c) % q), q);
    let d2 = mod_sub(&r2, &((y * &c) % q), q);
    (c, d1, d2)
}

#[allow(clippy::too_many_arguments)]
fn check_equal_coords(
    c: &BigUint,
    d1: &BigUint,
    d2: &BigUint,
    big_p: &BigUint,
    big_q: &BigUint,
    g1: &BigUint,
    g2: &BigUint,
    g3: &BigUint,
    version: u8,
    p: &BigUint,
) -> bool {
    let t1 = (mod_pow(g3, d1, p) * mod_pow(big_p, c, p)) % p;
    let t2 = (mod_pow(g1, d1, p) * mod_pow(g2, d2, p) % p * mod_pow(big_q, c, p)) % p;
    challenge(version, &[&t1, &t2]) == *c
}

/// Proof of knowledge of `x` such that `ratio_p^x == r_value`.
fn prove_equal_logs(ratio_p: &BigUint, x: &BigUint, version: u8, p: &BigUint, q: &BigUint) -> (BigUint, BigUint) {
    let r = random_exponent(q);
    let t1 = mod_pow(ratio_p, &r, p);
    let c = challenge(version, &[&t1]);
    let d = mod_sub(&r, &((x * &c) % q), q);
    (c, d)
}

fn check_equal_logs(
    c: &BigUint,
    d: &BigUint,
    ratio_p: &BigUint,
    r_value: &BigUint,
    version: u8,
    p: &BigUint,
) -> bool {
    let t1 = (mod_pow(ratio_p, d, p) * mod_pow(r_value, c, p)) % p;
    challenge(version, &[&t1]) == *c
}

fn is_valid_group_element(value: &BigUint, p: &BigUint, q: &BigUint) -> bool {
    *value >= BigUint::from(2u32) && *value <= (p - BigUint::from(2u32)) && value.modpow(q, p) == BigUint::one()
}

#[derive(Debug, Clone)]
pub struct Msg1 {
    pub g2a: Vec<u8>,
    pub c2: Vec<u8>,
    pub d2: Vec<u8>,
    pub g3a: Vec<u8>,
    pub c3: Vec<u8>,
    pub d3: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Msg2 {
    pub g2b: Vec<u8>,
    pub c2: Vec<u8>,
    pub d2: Vec<u8>,
    pub g3b: Vec<u8>,
    pub c3: Vec<u8>,
    pub d3: Vec<u8>,
    pub pb: Vec<u8>,
    pub qb: Vec<u8>,
    pub cp: Vec<u8>,
    pub d5: Vec<u8>,
    pub d6: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Msg3 {
    pub pa: Vec<u8>,
    pub qa: Vec<u8>,
    pub cp: Vec<u8>,
    pub d5: Vec<u8>,
    pub d6: Vec<u8>,
    pub ra: Vec<u8>,
    pub cr: Vec<u8>,
    pub d7: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Msg4 {
    pub rb: Vec<u8>,
    pub cr: Vec<u8>,
    pub d7: Vec<u8>,
}

fn be(v: &BigUint) -> Vec<u8> {
    v.to_bytes_be()
}

fn from_be(b: &[u8]) -> BigUint {
    BigUint::from_bytes_be(b)
}

/// One participant's running state across the four messages. `Smp::alice`
/// begins the exchange with `step1`; `Smp::bob` responds with `step2`.
pub struct Smp {
    p: BigUint,
    q: BigUint,
    g1: BigUint,
    x2: BigUint,
    x3: BigUint,
    g2: BigUint,
    g3: BigUint,
    secret: BigUint,
    // Alice only, populated in step3 for use in step5.
    ratio_q: Option<BigUint>,
    ratio_p: Option<BigUint>,
}

impl Smp {
    pub fn new() -> Self {
        Smp {
            p: modulus(),
            q: order(),
            g1: generator(),
            x2: BigUint::zero(),
            x3: BigUint::zero(),
            g2: BigUint::zero(),
            g3: BigUint::zero(),
            secret: BigUint::zero(),
            ratio_q: None,
            ratio_p: None,
        }
    }

    /// Alice: generates ephemeral exponents and the first message.
    pub fn step1(&mut self, secret: &str) -> Msg1 {
        self.x2 = random_exponent(&self.q);
        self.x3 = random_exponent(&self.q);
        self.secret = secret_to_exponent(secret);
        let g2a = mod_pow(&self.g1, &self.x2, &self.p);
        let g3a = mod_pow(&self.g1, &self.x3, &self.p);
        let (c2, d2) = prove_know_log(&self.g1, &self.x2, 1, &self.p, &self.q);
        let (c3, d3) = prove_know_log(&self.g1, &self.x3, 2, &self.p, &self.q);
        Msg1 {
            g2a: be(&g2a),
            c2: be(&c2),
            d2: be(&d2),
            g3a: be(&g3a),
            c3: be(&c3),
            d3: be(&d3),
        }
    }

    /// Bob: verifies Alice's proofs, combines the group generators, and
    /// builds his own message.
    pub fn step2(&mut self, input: &Msg1, secret: &str) -> Result<Msg2> {
        let g2a = from_be(&input.g2a);
        let g3a = from_be(&input.g3a);
        let c2 = from_be(&input.c2);
        let d2 = from_be(&input.d2);
        let c3 = from_be(&input.c3);
        let d3 = from_be(&input.d3);

        if !is_valid_group_element(&g2a, &self.p, &self.q) || !is_valid_group_element(&g3a, &self.p, &self.q) {
            return Err(CryptoError::PairingRejected);
        }
        if !check_know_log(&c2, &d2, &self.g1, &g2a, 1, &self.p)
            || !check_know_log(&c3, &d3, &self.g1, &g3a, 2, &self.p)
        {
            return Err(CryptoError::PairingRejected);
        }

        self.x2 = random_exponent(&self.q);
        self.x3 = random_exponent(&self.q);
        self.secret = secret_to_exponent(secret);
        let g2b = mod_pow(&self.g1, &self.x2, &self.p);
        let g3b = mod_pow(&self.g1, &self.x3, &self.p);
        let (c2b, d2b) = prove_know_log(&self.g1, &self.x2, 3, &self.p, &self.q);
        let (c3b, d3b) = prove_know_log(&self.g1, &self.x3, 4, &self.p, &self.q);

        self.g2 = mod_pow(&g2a, &self.x2, &self.p);
        self.g3 = mod_pow(&g3a, &self.x3, &self.p);

        let r = random_exponent(&self.q);
        let pb = mod_pow(&self.g3, &r, &self.p);
        let qb = (mod_pow(&self.g1, &r, &self.p) * mod_pow(&self.g2, &self.secret, &self.p)) % &self.p;
        let (cp, d5, d6) = prove_equal_coords(&self.g1, &self.g2, &self.g3, &r, &self.secret, 5, &self.p, &self.q);

        // Stash our own (Pb, Qb) for the final ratio computed in step4.
        self.ratio_p = Some(pb.clone());
        self.ratio_q = Some(qb.clone());

        Ok(Msg2 {
            g2b: be(&g2b),
            c2: be(&c2b),
            d2: be(&d2b),
            g3b: be(&g3b),
            c3: be(&c3b),
            d3: be(&d3b),
            pb: be(&pb),
            qb: be(&qb),
            cp: be(&cp),
            d5: be(&d5),
            d6: be(&d6),
        })
    }

    /// Alice: verifies Bob's proofs, computes her own `(Pa, Qa)` and the
    /// first half of the equal-logs proof.
    pub fn step3(&mut self, input: &Msg2) -> Result<Msg3> {
        let g2b = from_be(&input.g2b);
        let g3b = from_be(&input.g3b);
        let c2 = from_be(&input.c2);
        let d2 = from_be(&input.d2);
        let c3 = from_be(&input.c3);
        let d3 = from_be(&input.d3);
        let pb = from_be(&input.pb);
        let qb = from_be(&input.qb);
        let cp = from_be(&input.cp);
        let d5 = from_be(&input.d5);
        let d6 = from_be(&input.d6);

        if !is_valid_group_element(&g2b, &self.p, &self.q) || !is_valid_group_element(&g3b, &self.p, &self.q) {
            return Err(CryptoError::PairingRejected);
        }
        if !check_know_log(&c2, &d2, &self.g1, &g2b, 3, &self.p)
            || !check_know_log(&c3, &d3, &self.g1, &g3b, 4, &self.p)
        {
            return Err(CryptoError::PairingRejected);
        }

        self.g2 = mod_pow(&g2b, &self.x2, &self.p);
        self.g3 = mod_pow(&g3b, &self.x3, &self.p);

        if !check_equal_coords(&cp, &d5, &d6, &pb, &qb, &self.g1, &self.g2, &self.g3, 5, &self.p) {
            return Err(CryptoError::PairingRejected);
        }

        let ra_exp = random_exponent(&self.q);
        let pa = mod_pow(&self.g3, &ra_exp, &self.p);
        let qa = (mod_pow(&self.g1, &ra_exp, &self.p) * mod_pow(&self.g2, &self.secret, &self.p)) % &self.p;
        let (cp2, d5b, d6b) = prove_equal_coords(&self.g1, &self.g2, &self.g3, &ra_exp, &self.secret, 6, &self.p, &self.q);

        let ratio_p = (&pa * mod_inverse(&pb, &self.p)) % &self.p;
        let ratio_q = (&qa * mod_inverse(&qb, &self.p)) % &self.p;
        self.ratio_p = Some(ratio_p.clone());
        self.ratio_q = Some(ratio_q);

        let ra = mod_pow(&ratio_p, &self.x3, &self.p);
        let (cr, d7) = prove_equal_logs(&ratio_p, &self.x3, 7, &self.p, &self.q);

        Ok(Msg3 {
            pa: be(&pa),
            qa: be(&qa),
            cp: be(&cp2),
            d5: be(&d5b),
            d6: be(&d6b),
            ra: be(&ra),
            cr: be(&cr),
            d7: be(&d7),
        })
    }

    /// Bob: verifies Alice's proof and `(Pa, Qa)`, then reports whether the
    /// secrets matched alongside his own response message.
    pub fn step4(&mut self, input: &Msg3) -> Result<(Msg4, bool)> {
        let pa = from_be(&input.pa);
        let qa = from_be(&input.qa);
        let cp = from_be(&input.cp);
        let d5 = from_be(&input.d5);
        let d6 = from_be(&input.d6);
        let ra = from_be(&input.ra);
        let cr = from_be(&input.cr);
        let d7 = from_be(&input.d7);

        let pb = self.ratio_p.clone().expect("step2 populated Pb");
        let qb = self.ratio_q.clone().expect("step2 populated Qb");

        if !check_equal_coords(&cp, &d5, &d6, &pa, &qa, &self.g1, &self.g2, &self.g3, 6, &self.p) {
            return Err(CryptoError::PairingRejected);
        }

        let ratio_p = (&pa * mod_inverse(&pb, &self.p)) % &self.p;
        let ratio_q = (&qa * mod_inverse(&qb, &self.p)) % &self.p;

        if !check_equal_logs(&cr, &d7, &ratio_p, &ra, 7, &self.p) {
            return Err(CryptoError::PairingRejected);
        }

        let rb = mod_pow(&ratio_p, &self.x3, &self.p);
        let (cr2, d7b) = prove_equal_logs(&ratio_p, &self.x3, 8, &self.p, &self.q);

        let rab = mod_pow(&ra, &self.x3, &self.p);
        let matched = rab == ratio_q;

        Ok((
            Msg4 {
                rb: be(&rb),
                cr: be(&cr2),
                d7: be(&d7b),
            },
            matched,
        ))
    }

    /// Alice: verifies Bob's final proof and reports whether the secrets
    /// matched.
    pub fn step5(&mut self, input: &Msg4) -> Result<bool> {
        let rb = from_be(&input.rb);
        let cr = from_be(&input.cr);
        let d7 = from_be(&input.d7);
        let ratio_p = self.ratio_p.clone().expect("step3 populated ratio_p");
        let ratio_q = self.ratio_q.clone().expect("step3 populated ratio_q");

        if !check_equal_logs(&cr, &d7, &ratio_p, &rb, 8, &self.p) {
            return Err(CryptoError::PairingRejected);
        }

        let rba = mod_pow(&rb, &self.x3, &self.p);
        Ok(rba == ratio_q)
    }
}

impl Default for Smp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_pins_produce_mutual_success() {
        let mut alice = Smp::new();
        let mut bob = Smp::new();

        let msg1 = alice.step1("123456");
        let msg2 = bob.step2(&msg1, "123456").unwrap();
        let msg3 = alice.step3(&msg2).unwrap();
        let (msg4, bob_matched) = bob.step4(&msg3).unwrap();
        let alice_matched = alice.step5(&msg4).unwrap();

        assert!(bob_matched);
        assert!(alice_matched);
    }

    #[test]
    fn mismatched_pins_produce_mutual_failure() {
        let mut alice = Smp::new();
        let mut bob = Smp::new();

        let msg1 = alice.step1("123456");
        let msg2 = bob.step2(&msg1, "000000").unwrap();
        let msg3 = alice.step3(&msg2).unwrap();
        let (msg4, bob_matched) = bob.step4(&msg3).unwrap();
        let alice_matched = alice.step5(&msg4).unwrap();

        assert!(!bob_matched);
        assert!(!alice_matched);
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let mut alice = Smp::new();
        let mut bob = Smp::new();

        let mut msg1 = alice.step1("654321");
        msg1.d2[0] ^= 0xFF;
        assert!(bob.step2(&msg1, "654321").is_err());
    }
}

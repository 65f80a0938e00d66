use btmd_pow::difficulty::{
    compact_to_target, compact_to_u256, hash_meets_target, u256_to_compact,
};
use btmd_pow::{check_proof_of_work, CompactError, PowError};
use primitive_types::U256;

#[test]
fn mainnet_genesis_bits_roundtrip() {
    let bits = 0x1d00_ffff;
    let value = compact_to_u256(bits).expect("target");
    assert_eq!(u256_to_compact(value), bits);
}

#[test]
fn regtest_target_layout() {
    let target = compact_to_target(0x207f_ffff).expect("target");
    assert!(target[..29].iter().all(|b| *b == 0));
    assert_eq!(&target[29..], &[0xff, 0xff, 0x7f]);
}

#[test]
fn sign_bit_and_overflow_are_rejected() {
    assert_eq!(compact_to_u256(0x0480_0000), Err(CompactError::Negative));
    assert_eq!(compact_to_u256(0xff12_3456), Err(CompactError::Overflow));
}

#[test]
fn proof_of_work_compares_hash_to_target() {
    let mut low = [0u8; 32];
    low[0] = 1;
    assert!(check_proof_of_work(&low, 0x207f_ffff).is_ok());
    assert_eq!(
        check_proof_of_work(&[0xff; 32], 0x1d00_ffff),
        Err(PowError::HashAboveTarget)
    );

    let target = compact_to_target(0x1d00_ffff).expect("target");
    assert!(hash_meets_target(&target, &target));
    let one_more = U256::from_little_endian(&target) + U256::one();
    let above = one_more.to_little_endian();
    assert!(!hash_meets_target(&above, &target));
}

// Verification contract tests: existence gates everything, checksums
// compare case-insensitively, size mismatches only fail in strict mode.


use keg::verify::{ChecksumAlgorithm, FileInfo, Verifier};
use test_helpers::TestEnvironment;

// sha256 of b"hello"
const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
// sha1 of b"hello"
const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

#[test]
fn missing_file_fails_regardless_of_checksums() {
    let env = TestEnvironment::new();
    let info = FileInfo::new(env.fixtures_dir().join("ghost.tar.gz"))
        .with_checksum(ChecksumAlgorithm::Sha256, HELLO_SHA256);

    let result = Verifier::new(false).verify_file(&info);
    assert!(!result.file_exists);
    assert!(!result.is_successful());
}

#[test]
fn correct_sha256_with_no_expected_size_passes() {
    let env = TestEnvironment::new();
    let path = env.fixtures_dir().join("hello.txt");
    std::fs::write(&path, b"hello").unwrap();

    let info = FileInfo::new(&path).with_checksum(ChecksumAlgorithm::Sha256, HELLO_SHA256);
    let result = Verifier::new(false).verify_file(&info);
    assert!(result.file_exists);
    assert!(result.is_successful());
}

#[test]
fn uppercase_digest_still_matches() {
    let env = TestEnvironment::new();
    let path = env.fixtures_dir().join("hello.txt");
    std::fs::write(&path, b"hello").unwrap();

    let info = FileInfo::new(&path)
        .with_checksum(ChecksumAlgorithm::Sha256, &HELLO_SHA256.to_uppercase());
    assert!(Verifier::new(false).verify_file(&info).is_successful());
}

#[test]
fn size_mismatch_is_a_warning_unless_strict() {
    let env = TestEnvironment::new();
    let path = env.fixtures_dir().join("hello.txt");
    std::fs::write(&path, b"hello").unwrap();

    let info = FileInfo::new(&path)
        .with_size(9999)
        .with_checksum(ChecksumAlgorithm::Sha256, HELLO_SHA256);

    let lenient = Verifier::new(false).verify_file(&info);
    assert_eq!(lenient.size_matches, Some(false));
    assert!(!lenient.warnings.is_empty());
    assert!(lenient.is_successful());

    let strict = Verifier::new(true).verify_file(&info);
    assert!(!strict.is_successful());
}

#[test]
fn multiple_algorithms_all_checked() {
    let env = TestEnvironment::new();
    let path = env.fixtures_dir().join("hello.txt");
    std::fs::write(&path, b"hello").unwrap();

    let info = FileInfo::new(&path)
        .with_checksum(ChecksumAlgorithm::Sha256, HELLO_SHA256)
        .with_checksum(ChecksumAlgorithm::Sha1, HELLO_SHA1);
    let result = Verifier::new(false).verify_file(&info);
    assert!(result.is_successful());
    assert_eq!(result.checksums.len(), 2);

    let bad = FileInfo::new(&path)
        .with_checksum(ChecksumAlgorithm::Sha256, HELLO_SHA256)
        .with_checksum(ChecksumAlgorithm::Sha1, &"0".repeat(40));
    assert!(!Verifier::new(false).verify_file(&bad).is_successful());
}

//! Exit codes stay in the range shells leave to programs.

use misinfo_matcher::io::{ExitCode, JsonResponse};
use misinfo_matcher::{AnnError, MatchError, RecordStore};

#[test]
fn verify_exit_codes_are_unix_compliant() {
    let codes = [
        (ExitCode::Success, 0),
        (ExitCode::GeneralError, 1),
        (ExitCode::BlockingError, 2),
        (ExitCode::NotFound, 3),
        (ExitCode::InvalidInput, 4),
        (ExitCode::IoError, 5),
        (ExitCode::ConfigError, 6),
        (ExitCode::IndexCorrupted, 7),
    ];

    for (code, expected) in codes {
        let value = code as u8;
        assert_eq!(value, expected, "Exit code value mismatch for {code:?}");
        assert!(value <= 125, "Exit code {value} is in reserved range (126-255)");
    }
}

#[test]
fn test_uninitialized_record_store_maps_to_not_found_code() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = RecordStore::new(temp.path());
    let error = MatchError::from(store.len().unwrap_err());

    let response = JsonResponse::from_error(&error);
    assert_eq!(response.code, "NOT_FOUND");
    assert_eq!(response.status, "error");
}

#[test]
fn test_corrupt_index_response() {
    let error = MatchError::from(AnnError::CorruptIndex {
        reason: "dimension 3 does not match 768".to_string(),
    });
    let json = serde_json::to_value(JsonResponse::from_error(&error)).unwrap();
    assert_eq!(json["code"], "CORRUPT_INDEX");
    assert_eq!(json["exit_code"], 7);
    assert!(json["message"].as_str().unwrap().contains("dimension 3"));
}

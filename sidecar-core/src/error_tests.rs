/*!
Tests for the error taxonomy.
*/

#[cfg(test)]
mod tests {
    use crate::error::SidecarError;
    use std::path::PathBuf;

    #[test]
    fn test_sidecar_error_display() {
        let error = SidecarError::validation("obfuscation key must not be empty");
        assert_eq!(
            error.to_string(),
            "Validation error: obfuscation key must not be empty"
        );

        let error = SidecarError::malformed("expected value at line 1 column 1");
        assert_eq!(
            error.to_string(),
            "Malformed store: expected value at line 1 column 1"
        );

        let error = SidecarError::Storage("disk full".to_string());
        assert_eq!(error.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_duplicate_key_names_the_key() {
        let error = SidecarError::DuplicateKey {
            key: "gold".to_string(),
        };
        assert!(error.to_string().contains("gold"));
    }

    #[test]
    fn test_base_save_unavailable_names_the_path() {
        let error = SidecarError::base_save_unavailable("/saves/StoreFile.es3", "not found");
        let message = error.to_string();
        assert!(message.contains("/saves/StoreFile.es3"));
        assert!(message.contains("not found"));

        match error {
            SidecarError::BaseSaveUnavailable { path, .. } => {
                assert_eq!(path, PathBuf::from("/saves/StoreFile.es3"));
            }
            _ => panic!("Expected BaseSaveUnavailable variant"),
        }
    }

    #[test]
    fn test_type_mismatch_display() {
        let error = SidecarError::TypeMismatch {
            key: "gold".to_string(),
            expected: "u32",
            reason: "invalid type: string".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("gold"));
        assert!(message.contains("u32"));
    }

    #[test]
    fn test_io_category() {
        assert!(SidecarError::storage("disk full").is_io());
        assert!(SidecarError::base_save_unavailable("/saves/StoreFile.es3", "gone").is_io());
        assert!(!SidecarError::malformed("bad json").is_io());
    }

    #[test]
    fn test_sidecar_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = SidecarError::from(json_error);

        assert!(matches!(error, SidecarError::Json(_)));
        assert!(!error.is_io());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SidecarError>();
        assert_sync::<SidecarError>();
    }
}

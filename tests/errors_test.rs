#[cfg(test)]
mod error_tests {
    use camgate::errors::CameraError;
    use std::error::Error;

    #[test]
    fn test_camera_error_initialization() {
        let error = CameraError::InitializationError("Test init error".to_string());
        assert!(error.to_string().contains("Camera initialization error"));
        assert!(error.to_string().contains("Test init error"));
    }

    #[test]
    fn test_camera_error_unavailable() {
        let error = CameraError::CameraUnavailable("camera 3".to_string());
        assert_eq!(error.to_string(), "Camera unavailable: camera 3");
    }

    #[test]
    fn test_invalid_camera_display() {
        let error = CameraError::InvalidCamera("9".to_string());
        assert_eq!(format!("{}", error), "Invalid camera: 9");
    }

    #[test]
    fn test_update_error_wraps_source() {
        let cause = CameraError::CameraUnavailable("camera 2".to_string());
        let error = CameraError::update("Failed to create camera", cause.clone());

        assert_eq!(error.to_string(), "Camera update error: Failed to create camera");
        let source = error.source().expect("update error keeps its cause");
        assert_eq!(source.to_string(), cause.to_string());
    }

    #[test]
    fn test_leaf_errors_have_no_source() {
        let errors = vec![
            CameraError::InitializationError("e".to_string()),
            CameraError::CameraUnavailable("e".to_string()),
            CameraError::InvalidCamera("e".to_string()),
            CameraError::ExecutionRejected("e".to_string()),
            CameraError::ConfigError("e".to_string()),
            CameraError::TaskFailed("e".to_string()),
        ];

        for error in errors {
            let _error_trait: &dyn Error = &error;
            assert!(error.source().is_none());
        }
    }

    #[test]
    fn test_error_clone_and_equality() {
        let original = CameraError::update(
            "listener failed",
            CameraError::ExecutionRejected("shut down".to_string()),
        );
        let cloned = original.clone();
        assert_eq!(original, cloned);
        assert_ne!(
            original,
            CameraError::ExecutionRejected("shut down".to_string())
        );
    }

    #[test]
    fn test_error_message_extraction() {
        let test_message = "Detailed error information";

        match CameraError::ConfigError(test_message.to_string()) {
            CameraError::ConfigError(msg) => assert_eq!(msg, test_message),
            _ => panic!("Wrong error variant"),
        }

        match CameraError::update(test_message, CameraError::TaskFailed("x".to_string())) {
            CameraError::UpdateError { message, source } => {
                assert_eq!(message, test_message);
                assert_eq!(*source, CameraError::TaskFailed("x".to_string()));
            }
            _ => panic!("Wrong error variant"),
        }
    }

    #[test]
    fn test_error_long_message() {
        let long_message = "A".repeat(1000);
        let errors = vec![
            CameraError::InitializationError(long_message.clone()),
            CameraError::CameraUnavailable(long_message.clone()),
            CameraError::ConfigError(long_message.clone()),
        ];

        for error in errors {
            let display = error.to_string();
            assert!(
                display.len() > 1000,
                "Long error message should be preserved"
            );
            assert!(
                display.contains(&long_message),
                "Long message should be included in display"
            );
        }
    }

    #[test]
    fn test_error_debug_format() {
        let error = CameraError::InvalidCamera("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("InvalidCamera"));
        assert!(debug_str.contains("Debug test"));
    }
}

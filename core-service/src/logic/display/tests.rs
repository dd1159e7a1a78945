//! Integration Tests for the image store

#[cfg(test)]
mod integration_tests {
    use std::time::Duration;

    use crate::logic::display::{ImageNaming, ImageStore};
    use crate::logic::error::RiskError;
    use crate::logic::explain::{AggregatedExplanation, Contribution};
    use crate::logic::render::{render_waterfall, ExplanationImage, RenderConfig};

    fn sample_image() -> ExplanationImage {
        let agg = AggregatedExplanation {
            baseline: -2.0,
            top_contributions: vec![
                Contribution::new("Age", 0.9),
                Contribution::new("Sex", 0.2),
                Contribution::new("Cholesterol ratio", -0.1),
            ],
            other: Contribution::other(0.05),
        };
        render_waterfall(&agg, &RenderConfig::new(50, 4.0, 1.5)).unwrap()
    }

    #[test]
    fn test_publish_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest).unwrap();

        let image = sample_image();
        let published = store.publish(&image).unwrap();

        assert!(uuid::Uuid::parse_str(&published.id).is_ok());
        assert_eq!((published.width, published.height), (200, 75));
        assert_eq!(store.resolve(&published.id), Some(published.path.clone()));
        assert_eq!(std::fs::read(&published.path).unwrap(), image.png);

        // No temp files left behind
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_per_request_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest).unwrap();
        let image = sample_image();

        let a = store.publish(&image).unwrap();
        let b = store.publish(&image).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.path.exists() && b.path.exists());
    }

    #[test]
    fn test_write_failure_is_image_persist() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("images");
        let store = ImageStore::new(&target, ImageNaming::PerRequest).unwrap();

        // Directory replaced by a plain file: every write fails
        std::fs::remove_dir(&target).unwrap();
        std::fs::write(&target, b"in the way").unwrap();

        let err = store.publish(&sample_image()).unwrap_err();
        assert!(matches!(err, RiskError::ImagePersist { .. }));
    }

    #[test]
    fn test_corrupt_bytes_never_exposed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest).unwrap();

        let broken = ExplanationImage {
            png: b"definitely not a png".to_vec(),
            width: 10,
            height: 10,
            dpi: 100,
        };
        let err = store.publish(&broken).unwrap_err();
        assert!(matches!(err, RiskError::ImagePersist { .. }));
        assert!(err.to_string().contains("decode failed"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest).unwrap();

        let mut image = sample_image();
        image.width += 1;
        assert!(store.publish(&image).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fixed_mode_overwrites_and_clears_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ImageStore::new(dir.path(), ImageNaming::Fixed("current".to_string())).unwrap();

        let first = store.publish(&sample_image()).unwrap();
        let second = store.publish(&sample_image()).unwrap();
        assert_eq!(first.id, "current");
        assert_eq!(first.path, second.path);
        assert!(store.resolve("current").is_some());

        // A failed publish removes the previous image instead of leaving it looking current
        let broken = ExplanationImage {
            png: vec![0; 16],
            width: 1,
            height: 1,
            dpi: 1,
        };
        assert!(store.publish(&broken).is_err());
        assert!(store.resolve("current").is_none());
    }

    #[test]
    fn test_fixed_name_must_be_plain() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageStore::new(dir.path(), ImageNaming::Fixed("../escape".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn test_resolve_rejects_foreign_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest).unwrap();
        std::fs::write(dir.path().join("secret.png"), b"x").unwrap();

        assert!(store.resolve("secret").is_none());
        assert!(store.resolve("../secret").is_none());
        assert!(store.resolve(&uuid::Uuid::new_v4().to_string()).is_none());
    }

    #[test]
    fn test_sweep_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest).unwrap();
        let published = store.publish(&sample_image()).unwrap();
        std::fs::write(dir.path().join("keep.png"), b"not ours").unwrap();

        assert_eq!(store.sweep_expired(Duration::from_secs(3600)), 0);
        assert_eq!(store.sweep_expired(Duration::ZERO), 1);
        assert!(!published.path.exists());
        assert!(dir.path().join("keep.png").exists());
    }

    #[test]
    fn test_publish_sweeps_with_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), ImageNaming::PerRequest)
            .unwrap()
            .with_ttl(Duration::ZERO);

        let first = store.publish(&sample_image()).unwrap();
        let second = store.publish(&sample_image()).unwrap();
        assert!(!first.path.exists());
        assert!(second.path.exists());
    }
}

use filegate_storage::path::{normalize, resolve_relative};
use filegate_storage::*;
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,8}(\\.[a-z]{1,3})?"
}

fn relative_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..5)
}

proptest! {
    #[test]
    fn normalize_is_idempotent_and_separator_agnostic(parts in relative_path(), windows in any::<bool>()) {
        let sep = if windows { "\\" } else { "/" };
        let raw = format!("{sep}{}{sep}", parts.join(sep));

        let once = normalize(&raw);
        prop_assert_eq!(&once, &parts.join("/"));
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn climbing_above_root_is_always_rejected(parts in relative_path(), extra in 1usize..4) {
        let ups = vec![".."; parts.len() + extra].join("/");
        let raw = format!("{}/{ups}/escape.txt", parts.join("/"));

        let err = resolve_relative(&raw).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn local_backend_never_writes_outside_its_root(parts in relative_path(), extra in 1usize..3) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("root");

        let ups = vec![".."; parts.len() + extra].join("\\");
        let raw = format!("{}\\{ups}\\escape.txt", parts.join("\\"));

        let kind = rt.block_on(async {
            let config = BackendConfig::from([("basePath", root.display().to_string())]);
            let backend = BackendFactory::new().create("local", "prop", &config).await.unwrap();
            backend.write(&raw, b"x").await.unwrap_err().kind()
        });

        prop_assert_eq!(kind, ErrorKind::Unauthorized);
        prop_assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn memory_roundtrip_preserves_bytes(parts in relative_path(), content in prop::collection::vec(any::<u8>(), 0..256)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let path = parts.join("/");

        let read = rt.block_on(async {
            let backend = BackendFactory::new().create("memory", "prop", &BackendConfig::new()).await.unwrap();
            backend.write(&path, &content).await.unwrap();
            backend.read(&path.to_uppercase()).await.unwrap()
        });

        prop_assert_eq!(read, content);
    }
}

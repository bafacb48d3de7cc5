use std::path::PathBuf;

use serde_json::json;
use uuid::Uuid;

use registry::{DataRegistry, DataValue, Scalar};

struct TestSpace {
    cache_root: PathBuf,
    file: PathBuf,
}

impl TestSpace {
    fn new(ext: &str) -> Self {
        let tag = Uuid::new_v4();
        Self {
            cache_root: std::env::temp_dir().join(format!("roundtrip_cache_{tag}")),
            file: std::env::temp_dir().join(format!("roundtrip_{tag}.{ext}")),
        }
    }

    fn config(&self) -> configs::AppConfig {
        self.config_with_capacity(1024)
    }

    fn config_with_capacity(&self, map_capacity: usize) -> configs::AppConfig {
        let mut cfg = configs::AppConfig::default();
        cfg.registry.cache_root = self.cache_root.display().to_string();
        cfg.registry.map_capacity = map_capacity;
        cfg
    }

    async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.cache_root).await;
        let _ = tokio::fs::remove_file(&self.file).await;
    }
}

#[tokio::test]
async fn save_caches_round_trips_a_set_through_the_file() -> Result<(), anyhow::Error> {
    let space = TestSpace::new("json");

    // first run: populate and flush
    {
        let registry = DataRegistry::with_config(&space.config());
        registry
            .register_cache(
                "jobs/seen",
                DataValue::empty_set(),
                Some(space.file.as_path()),
                "run1",
                true,
                true,
                true,
                None,
                None,
                true,
            )
            .await?;
        let entry = registry.get("jobs/seen").await.expect("entry");
        let set = entry.as_set_cache().expect("set container");
        set.insert(1).await?;
        set.insert("two").await?;
        set.insert(3).await?;
        registry.save_caches().await;
    }

    // second run: a different session seeds its container from the file
    let registry = DataRegistry::with_config(&space.config());
    registry
        .register_cache(
            "jobs/seen",
            DataValue::empty_set(),
            Some(space.file.as_path()),
            "run2",
            true,
            true,
            true,
            None,
            None,
            true,
        )
        .await?;
    let entry = registry.get("jobs/seen").await.expect("entry");
    let set = entry.as_set_cache().expect("set container");
    assert_eq!(set.len().await, 3);
    assert!(set.contains(&Scalar::Int(1)).await);
    assert!(set.contains(&Scalar::from("two")).await);
    assert!(set.contains(&Scalar::Int(3)).await);

    space.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn map_cache_round_trips_and_honors_capacity() -> Result<(), anyhow::Error> {
    let space = TestSpace::new("json");

    {
        let registry = DataRegistry::with_config(&space.config_with_capacity(3));
        registry
            .register_cache(
                "lookup",
                DataValue::empty_map(),
                Some(space.file.as_path()),
                "maps",
                true,
                true,
                true,
                None,
                None,
                false,
            )
            .await?;
        let entry = registry.get("lookup").await.expect("entry");
        let map = entry.as_map_cache().expect("map container");
        map.put("a", json!(1)).await?;
        map.put("b", json!(2)).await?;
        map.put("c", json!(3)).await?;
        // fourth key evicts the least-recently-used "a"
        map.put("d", json!(4)).await?;
        assert_eq!(map.len().await, 3);
        assert!(!map.contains("a").await);
        registry.save_caches().await;
    }

    let registry = DataRegistry::with_config(&space.config_with_capacity(3));
    registry
        .register_cache(
            "lookup",
            DataValue::empty_map(),
            Some(space.file.as_path()),
            "maps2",
            true,
            true,
            true,
            None,
            None,
            false,
        )
        .await?;
    let entry = registry.get("lookup").await.expect("entry");
    let map = entry.as_map_cache().expect("map container");
    assert_eq!(map.len().await, 3);
    assert_eq!(map.get("b").await?, Some(json!(2)));
    assert_eq!(map.get("c").await?, Some(json!(3)));
    assert_eq!(map.get("d").await?, Some(json!(4)));

    space.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn cache_only_entries_work_without_a_file() -> Result<(), anyhow::Error> {
    let space = TestSpace::new("json");

    let registry = DataRegistry::with_config(&space.config());
    registry
        .register_cache(
            "scratch",
            DataValue::Seq(vec![Scalar::Int(1)]),
            None,
            "local",
            false,
            true,
            true,
            None,
            None,
            true,
        )
        .await?;
    let entry = registry.get("scratch").await.expect("entry");
    let log = entry.as_log_cache().expect("log container");
    log.push(2).await?;
    assert_eq!(log.snapshot().await, vec![Scalar::Int(1), Scalar::Int(2)]);

    // nothing to flush to a file, but the traversals must not fail
    registry.save().await;
    registry.save_caches().await;

    space.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn clean_clears_containers_and_removes_their_directories() -> Result<(), anyhow::Error> {
    let space = TestSpace::new("json");

    let registry = DataRegistry::with_config(&space.config());
    registry
        .register_cache(
            "jobs/done",
            DataValue::empty_set(),
            None,
            "jobs",
            true,
            true,
            true,
            None,
            None,
            true,
        )
        .await?;
    let entry = registry.get("jobs/done").await.expect("entry");
    let set = entry.as_set_cache().expect("set container");
    set.insert(42).await?;
    let dir = set.directory().to_path_buf();
    assert!(tokio::fs::metadata(&dir).await.is_ok());

    registry.clean().await?;
    assert_eq!(set.len().await, 0);
    assert!(tokio::fs::metadata(&dir).await.is_err());

    space.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn cache_seed_falls_back_to_initial_when_no_file_exists() -> Result<(), anyhow::Error> {
    let space = TestSpace::new("json");

    let registry = DataRegistry::with_config(&space.config());
    let initial: std::collections::HashSet<Scalar> =
        [Scalar::Int(5), Scalar::from("five")].into_iter().collect();
    registry
        .register_cache(
            "seeded",
            DataValue::Set(initial),
            Some(space.file.as_path()),
            "seeds",
            true,
            true,
            true,
            None,
            None,
            true,
        )
        .await?;
    let entry = registry.get("seeded").await.expect("entry");
    assert_eq!(entry.len().await, 2);

    space.cleanup().await;
    Ok(())
}

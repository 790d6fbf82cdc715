use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

use regula_knowledge::index::QdrantOps;
use regula_knowledge::{
    Chunk, ChunkId, DocumentMetadata, EmbeddingVector, IndexBackend, IndexEntry, IndexError,
    IndexManager, VectorOwner, VectorSpec,
};

const QDRANT_GRPC_PORT: ContainerPort = ContainerPort::Tcp(6334);

fn qdrant_image() -> GenericImage {
    GenericImage::new("qdrant/qdrant", "v1.16.0")
        .with_wait_for(WaitFor::message_on_stdout("gRPC listening"))
        .with_exposed_port(QDRANT_GRPC_PORT)
}

async fn start() -> (ContainerAsync<GenericImage>, QdrantOps) {
    let container = qdrant_image().start().await.unwrap();
    let port = container.get_host_port_ipv4(6334).await.unwrap();
    let ops = QdrantOps::new(&format!("http://127.0.0.1:{port}")).unwrap();
    (container, ops)
}

fn spec() -> VectorSpec {
    VectorSpec {
        model: "test-model".into(),
        dimension: 3,
    }
}

fn entry(source: &str, sequence: usize, values: Vec<f32>) -> IndexEntry {
    let metadata = DocumentMetadata::new(source, "txt");
    let id = ChunkId::new(&metadata, sequence);
    IndexEntry {
        chunk: Chunk {
            id: id.clone(),
            text: format!("{source} {sequence}"),
            start: 0,
            end: 0,
            sequence,
            metadata,
        },
        vector: EmbeddingVector {
            owner: VectorOwner::Chunk(id),
            values,
            model: "test-model".into(),
        },
    }
}

fn query(values: Vec<f32>) -> EmbeddingVector {
    EmbeddingVector {
        owner: VectorOwner::Query,
        values,
        model: "test-model".into(),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn build_search_and_reload() {
    let (_container, ops) = start().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = IndexBackend::Qdrant {
        root: dir.path().to_path_buf(),
        ops,
    };

    let manager = IndexManager::new(backend.clone());
    manager
        .build(
            "nis2",
            spec(),
            vec![
                entry("a", 0, vec![1.0, 0.0, 0.0]),
                entry("a", 1, vec![0.0, 1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let index = manager.current("nis2").unwrap();
    let hits = index.search(&query(vec![0.9, 0.1, 0.0]), 2).await.unwrap();
    assert_eq!(hits[0].chunk.sequence, 0);
    assert!(hits[0].score >= hits[1].score);

    let reloaded = IndexManager::new(backend);
    let index = reloaded.load("nis2", &spec()).await.unwrap().unwrap();
    assert_eq!(index.len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn rebuild_swaps_generation() {
    let (_container, ops) = start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = IndexManager::new(IndexBackend::Qdrant {
        root: dir.path().to_path_buf(),
        ops,
    });

    manager
        .build("c", spec(), vec![entry("old", 0, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    manager
        .build("c", spec(), vec![entry("new", 0, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();

    let index = manager.current("c").unwrap();
    let hits = index.search(&query(vec![1.0, 0.0, 0.0]), 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.metadata.source, "new");

    let other = VectorSpec {
        model: "other".into(),
        dimension: 3,
    };
    let fresh = IndexManager::new(manager.backend().clone());
    assert!(matches!(
        fresh.load("c", &other).await,
        Err(IndexError::Mismatch { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn earlier_snapshot_keeps_serving_after_rebuild() {
    let (_container, ops) = start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = IndexManager::new(IndexBackend::Qdrant {
        root: dir.path().to_path_buf(),
        ops,
    });
    let unit = || query(vec![1.0, 0.0, 0.0]);

    manager
        .build("c", spec(), vec![entry("g1", 0, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    let first = manager.current("c").unwrap();

    manager
        .build("c", spec(), vec![entry("g2", 0, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    let second = manager.current("c").unwrap();

    let hits = first.search(&unit(), 5).await.unwrap();
    assert_eq!(hits[0].chunk.metadata.source, "g1");

    // A third build drops generation 1 but keeps generation 2.
    manager
        .build("c", spec(), vec![entry("g3", 0, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    let hits = second.search(&unit(), 5).await.unwrap();
    assert_eq!(hits[0].chunk.metadata.source, "g2");
    assert!(first.search(&unit(), 5).await.is_err());

    let live = manager.current("c").unwrap();
    let hits = live.search(&unit(), 5).await.unwrap();
    assert_eq!(hits[0].chunk.metadata.source, "g3");
}

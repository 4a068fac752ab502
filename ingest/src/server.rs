use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use health::{ComponentStatus, HealthRegistry};
use tokio::net::TcpListener;

use crate::audit::AuditWriter;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::notify::{KafkaNotifier, Notifier, PrintNotifier};
use crate::processor::Processor;
use crate::redis::RedisClient;
use crate::registry::{MemoryRegistry, RedisRegistry, Registry};
use crate::router;
use crate::store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use crate::time::SystemClock;
use crate::validate::{EntityDirectory, EntityValidator, MemoryDirectory, RedisDirectory};

const COMPONENT_DEADLINE: Duration = Duration::from_secs(30);

struct Backends {
    registry: Arc<dyn Registry>,
    audit_store: Arc<dyn ObjectStore>,
    catalog_store: Arc<dyn ObjectStore>,
    directory: Arc<dyn EntityDirectory>,
    notifier: Arc<dyn Notifier>,
}

fn memory_backends(liveness: &HealthRegistry) -> Backends {
    // Memory backends are only for local debug; keep the probe red so a
    // container running them can't pass for prod.
    liveness
        .register("memory_backends", COMPONENT_DEADLINE)
        .report_status(ComponentStatus::Unhealthy);

    Backends {
        registry: Arc::new(MemoryRegistry::new()),
        audit_store: Arc::new(MemoryObjectStore::new()),
        catalog_store: Arc::new(MemoryObjectStore::new()),
        directory: Arc::new(MemoryDirectory::new()),
        notifier: Arc::new(PrintNotifier {}),
    }
}

async fn production_backends(
    config: &Config,
    liveness: &HealthRegistry,
    retention: Duration,
) -> anyhow::Result<Backends> {
    let redis = Arc::new(RedisClient::new(config.redis_url.clone())?);

    let audit_store = S3ObjectStore::new(
        config.audit_bucket.clone(),
        config.s3_endpoint.clone(),
        liveness.register("audit_store", COMPONENT_DEADLINE),
    )
    .await?;
    let catalog_store = S3ObjectStore::new(
        config.catalog_bucket.clone(),
        config.s3_endpoint.clone(),
        liveness.register("catalog_store", COMPONENT_DEADLINE),
    )
    .await?;
    let notifier = KafkaNotifier::new(
        &config.kafka,
        liveness.register("rdkafka", COMPONENT_DEADLINE),
    )?;

    Ok(Backends {
        registry: Arc::new(RedisRegistry::new(
            redis.clone(),
            retention,
            config.redis_key_prefix.clone(),
        )),
        audit_store: Arc::new(audit_store),
        catalog_store: Arc::new(catalog_store),
        directory: Arc::new(RedisDirectory::new(redis, config.redis_key_prefix.clone())),
        notifier: Arc::new(notifier),
    })
}

async fn build_processor(config: &Config, liveness: &HealthRegistry) -> anyhow::Result<Processor> {
    let retention = Duration::from_secs(config.registry_retention_days * 24 * 60 * 60);

    let backends = if config.memory_backends {
        memory_backends(liveness)
    } else {
        production_backends(config, liveness, retention).await?
    };

    let audit = AuditWriter::new(backends.audit_store);
    let catalog = Catalog::new(backends.catalog_store);
    let validator = EntityValidator::new(backends.directory, audit.clone(), catalog.clone());

    Ok(Processor::new(
        backends.registry,
        audit,
        catalog,
        validator,
        backends.notifier,
        Arc::new(SystemClock::default()),
        retention,
        config.event_version.clone(),
    ))
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let liveness = HealthRegistry::new("liveness");

    let processor = build_processor(&config, &liveness)
        .await
        .expect("failed to initialize the processing pipeline");

    let app = router::router(Arc::new(processor), liveness, config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}

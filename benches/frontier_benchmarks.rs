use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sitewalker::domain::models::NewQueueItem;
use sitewalker::repository::FrontierRepository;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    sqlx::query("INSERT INTO projects (name, settings_blob, created_at) VALUES ('bench', '{}', datetime('now'))")
        .execute(&pool)
        .await
        .expect("seed project");
    pool
}

fn bench_enqueue(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("frontier_enqueue");

    for size in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&runtime).iter(|| async move {
                let pool = setup_pool().await;
                let repo = FrontierRepository::new(pool);
                for i in 0..size {
                    let address = format!("https://example.com/page-{i}");
                    repo.enqueue(&NewQueueItem {
                        project_id: 1,
                        address: address.clone(),
                        normalized_key: address,
                        host_key: "example.com".to_string(),
                        priority: 0,
                        depth: 1,
                    })
                    .await
                    .unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_get_next_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("frontier_drain_1000", |b| {
        b.to_async(&runtime).iter(|| async move {
            let pool = setup_pool().await;
            let repo = FrontierRepository::new(pool);
            for i in 0..1000 {
                let address = format!("https://example.com/page-{i}");
                repo.enqueue(&NewQueueItem {
                    project_id: 1,
                    address: address.clone(),
                    normalized_key: address,
                    host_key: "example.com".to_string(),
                    priority: 0,
                    depth: 1,
                })
                .await
                .unwrap();
            }
            while repo.get_next(1).await.unwrap().is_some() {}
        });
    });
}

criterion_group!(benches, bench_enqueue, bench_get_next_drain);
criterion_main!(benches);

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use sandbox_engine::{
    EngineConfig, MemChainFactory, MemStore, NewScriptExecution,
    NewTransactionExecution, Project, ProjectEngine, ProjectId,
};

fn engine() -> Arc<ProjectEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(ProjectEngine::new(
        Arc::new(MemStore::new()),
        Arc::new(MemChainFactory),
        EngineConfig {
            pool_capacity: 3,
            cache_capacity: 8,
        },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creations_get_distinct_addresses() {
    let engine = engine();
    let p = Project {
        id: ProjectId::new(1),
        number_of_accounts: 5,
    };
    engine.reset(&p).await.unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.create_account(p.id).await.unwrap() })
        })
        .collect();
    let accounts = join_all(tasks).await;

    let addresses: HashSet<String> = accounts
        .into_iter()
        .map(|a| a.unwrap().address.to_hex())
        .collect();
    // serialized behind the project's write lock: four creations, four
    // consecutive addresses after the five seeds, in some order
    let expected: HashSet<String> = (6..10u64)
        .map(|n| format!("0x{:016x}", n))
        .collect();
    assert_eq!(addresses, expected);
    assert_eq!(engine.latest_block_height(p.id).await.unwrap(), 9);
    assert_eq!(engine.lock_table_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_projects_proceed_independently() {
    let engine = engine();
    let mut tasks = Vec::new();
    for raw in 1..=6u128 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let p = Project {
                id: ProjectId::new(raw),
                number_of_accounts: 2,
            };
            engine.reset(&p).await.unwrap();
            for _ in 0..3 {
                // jitter shuffles the interleaving between projects
                let pause = rand::thread_rng().gen_range(0..3u64);
                tokio::time::sleep(Duration::from_millis(pause)).await;
                engine
                    .execute_transaction(NewTransactionExecution {
                        project_id: p.id,
                        script: r#"transaction { execute { log("tick") } }"#
                            .to_string(),
                        arguments: Vec::new(),
                        signers: Vec::new(),
                    })
                    .await
                    .unwrap();
            }
            engine.latest_block_height(p.id).await.unwrap()
        }));
    }
    for height in join_all(tasks).await {
        // 2 seeds + 3 transactions, regardless of interleaving
        assert_eq!(height.unwrap(), 5);
    }
    assert_eq!(engine.lock_table_len(), 0);
    assert_eq!(engine.cache_len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scripts_share_the_read_lock() {
    let engine = engine();
    let p = Project {
        id: ProjectId::new(7),
        number_of_accounts: 3,
    };
    engine.reset(&p).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .execute_script(NewScriptExecution {
                        project_id: p.id,
                        script: "pub fun main(): UInt64 { return height() }"
                            .to_string(),
                        arguments: Vec::new(),
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();
    for exe in join_all(tasks).await {
        assert_eq!(exe.unwrap().value, "3");
    }
    assert_eq!(engine.lock_table_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_refills_after_a_burst() {
    let engine = engine();
    let mut tasks = Vec::new();
    for seed in 0..6u64 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let p = Project {
                id: ProjectId::from_seed(seed),
                number_of_accounts: 1,
            };
            engine.reset(&p).await.unwrap();
        }));
    }
    for done in join_all(tasks).await {
        done.unwrap();
    }
    // background replenishment brings the pool back to capacity
    for _ in 0..500 {
        if engine.pool_len() >= 3 {
            break
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(engine.pool_len(), 3);
}

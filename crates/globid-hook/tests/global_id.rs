use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use globid_hook::{
    register_global_id_hook, GlobalIdColumn, GlobalIdConfig, GlobalIdHook, GlobalIdRewriter,
    HookOutcome, HookParams, HookPipeline, HookRegistry, RegistryError, RewriteError,
    SkipReason, StatementHook, TableRef, GLOBAL_ID_HOOK,
};
use globid_sql::{parse_statement, render, NodeType, StatementTree};
use globid_store::{CounterKey, CounterStore, IdCache, MemoryStore, StoreError, StoreOptions};

struct FailingStore {
    inner: MemoryStore,
    fail: AtomicBool,
}

impl CounterStore for FailingStore {
    fn fetch(&self, key: &[u8]) -> globid_store::Result<Option<Vec<u8>>> {
        self.inner.fetch(key)
    }

    fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> globid_store::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "write refused",
            )));
        }
        self.inner.insert(key, value)
    }
}

fn columns() -> Arc<GlobalIdConfig> {
    Arc::new(
        GlobalIdConfig::from_entries([GlobalIdColumn {
            schema: "app".into(),
            table: "t".into(),
            column: "gid".into(),
        }])
        .unwrap(),
    )
}

fn hook_with_store(store: Arc<dyn CounterStore>) -> GlobalIdHook {
    let cache = Arc::new(IdCache::with_store(store));
    GlobalIdHook::new(GlobalIdRewriter::new(cache, columns()))
}

fn memory_hook() -> GlobalIdHook {
    hook_with_store(Arc::new(MemoryStore::new()))
}

fn apply(hook: &GlobalIdHook, sql: &str) -> (HookOutcome, StatementTree, HookParams) {
    let mut tree = parse_statement(sql).unwrap();
    let root = tree.root();
    let mut params = HookParams::new("app");
    let outcome = hook.run(&mut tree, root, &mut params);
    (outcome, tree, params)
}

fn key() -> CounterKey {
    CounterKey::new("app", "t", "gid")
}

#[test]
fn missing_column_is_appended() {
    let hook = memory_hook();
    let (outcome, tree, params) = apply(&hook, "INSERT INTO t (a, b) VALUES (1, 2)");

    assert!(outcome.is_applied());
    assert_eq!(render(&tree), "INSERT INTO t (a, b, gid) VALUES (1, 2, 1)");
    assert_eq!(
        params.target,
        Some(TableRef {
            schema: "app".into(),
            table: "t".into()
        })
    );

    let root = tree.root();
    let format = tree.find_type(root, NodeType::FORMAT_LIST).unwrap();
    let values = tree.find_type(root, NodeType::VALUE_LIST).unwrap();
    assert_eq!(tree.children(format).len(), tree.children(values).len());
    let last_value = *tree.children(values).last().unwrap();
    assert_eq!(tree.ty(last_value), Some(NodeType::INTEGER));
}

#[test]
fn existing_value_is_overwritten() {
    let hook = memory_hook();
    hook.rewriter().cache().fetch_and_add(key().as_bytes()).unwrap();

    let (outcome, tree, _) = apply(&hook, "INSERT INTO t (a, gid) VALUES (1, 99)");
    assert!(outcome.is_applied());
    assert_eq!(render(&tree), "INSERT INTO t (a, gid) VALUES (1, 2)");
}

#[test]
fn each_row_gets_its_own_id() {
    let hook = memory_hook();
    let (outcome, tree, _) = apply(&hook, "INSERT INTO t (a, b) VALUES (1, 2), (3, 4)");
    assert!(outcome.is_applied());
    assert_eq!(
        render(&tree),
        "INSERT INTO t (a, b, gid) VALUES (1, 2, 1), (3, 4, 2)"
    );

    let (_, tree, _) = apply(&hook, "INSERT INTO t (gid, a) VALUES (0, 5), (0, 6), (0, 7)");
    assert_eq!(
        render(&tree),
        "INSERT INTO t (gid, a) VALUES (3, 5), (4, 6), (5, 7)"
    );
}

#[test]
fn unconfigured_table_fails_without_touching_the_tree() {
    let hook = memory_hook();
    let sql = "INSERT INTO u (a, b) VALUES (1, 2)";
    let pristine = parse_statement(sql).unwrap();

    let (outcome, tree, _) = apply(&hook, sql);
    match outcome {
        HookOutcome::Failed(RewriteError::ConfigurationMissing { schema, table }) => {
            assert_eq!((schema.as_str(), table.as_str()), ("app", "u"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(tree, pristine);
    assert_eq!(render(&tree), sql);
}

#[test]
fn reused_params_do_not_keep_a_stale_target() {
    let hook = memory_hook();
    let mut params = HookParams::new("app");

    let mut tree = parse_statement("INSERT INTO t (a) VALUES (1)").unwrap();
    let root = tree.root();
    assert!(hook.run(&mut tree, root, &mut params).is_applied());
    assert!(params.target.is_some());

    let mut tree = parse_statement("INSERT INTO u (a) VALUES (1)").unwrap();
    let root = tree.root();
    assert!(hook.run(&mut tree, root, &mut params).is_failure());
    assert_eq!(params.target, None);
}

#[test]
fn quoted_identifiers_survive_the_rewrite() {
    let columns = Arc::new(
        GlobalIdConfig::from_entries([GlobalIdColumn {
            schema: "app".into(),
            table: "order".into(),
            column: "global id".into(),
        }])
        .unwrap(),
    );
    let cache = Arc::new(IdCache::with_store(Arc::new(MemoryStore::new())));
    let hook = GlobalIdHook::new(GlobalIdRewriter::new(cache, columns));

    let (outcome, tree, _) = apply(&hook, "INSERT INTO `order` (`key`) VALUES (5)");
    assert!(outcome.is_applied());
    let rendered = render(&tree);
    assert_eq!(
        rendered,
        "INSERT INTO `order` (`key`, `global id`) VALUES (5, 1)"
    );
    assert!(parse_statement(&rendered).is_ok());
}

#[test]
fn placeholder_slot_is_skipped() {
    let hook = memory_hook();
    let sql = "INSERT INTO t (a, gid) VALUES (1, ?)";
    let pristine = parse_statement(sql).unwrap();

    let (outcome, tree, params) = apply(&hook, sql);
    assert!(matches!(outcome, HookOutcome::Skipped(SkipReason::Placeholder)));
    assert_eq!(tree, pristine);
    assert!(params.target.is_some());
    assert_eq!(hook.rewriter().cache().peek(key().as_bytes()).unwrap(), 0);
}

#[test]
fn placeholder_rows_do_not_block_literal_rows() {
    let hook = memory_hook();
    let (outcome, tree, _) = apply(&hook, "INSERT INTO t (a, gid) VALUES (1, ?), (2, 0), (3, ?)");
    assert!(outcome.is_applied());
    assert_eq!(
        render(&tree),
        "INSERT INTO t (a, gid) VALUES (1, ?), (2, 1), (3, ?)"
    );
}

#[test]
fn storage_failure_fails_the_statement() {
    let store = Arc::new(FailingStore {
        inner: MemoryStore::new(),
        fail: AtomicBool::new(true),
    });
    let hook = hook_with_store(store.clone());
    let sql = "INSERT INTO t (a, b) VALUES (1, 2), (3, 4)";
    let pristine = parse_statement(sql).unwrap();

    let (outcome, tree, _) = apply(&hook, sql);
    assert!(matches!(
        outcome,
        HookOutcome::Failed(RewriteError::Storage(StoreError::Io(_)))
    ));
    assert_eq!(tree, pristine);

    store.fail.store(false, Ordering::SeqCst);
    let (outcome, tree, _) = apply(&hook, sql);
    assert!(outcome.is_applied());
    assert_eq!(
        render(&tree),
        "INSERT INTO t (a, b, gid) VALUES (1, 2, 1), (3, 4, 2)"
    );
}

#[test]
fn unsupported_shapes_are_skipped() {
    let hook = memory_hook();
    for (sql, reason) in [
        ("SELECT 1", SkipReason::NotInsert),
        ("INSERT INTO t (a) SELECT a FROM s", SkipReason::InsertSelect),
        ("INSERT INTO t VALUES (1)", SkipReason::MissingFormatList),
    ] {
        let (outcome, tree, _) = apply(&hook, sql);
        match outcome {
            HookOutcome::Skipped(got) => assert_eq!(got, reason, "{sql}"),
            other => panic!("{sql}: unexpected outcome {other:?}"),
        }
        assert_eq!(render(&tree), sql);
    }
}

#[test]
fn concurrent_statements_receive_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions {
        sync_writes: false,
        ..StoreOptions::default()
    };
    let cache = Arc::new(IdCache::open(dir.path(), options).unwrap());
    let hook = Arc::new(GlobalIdHook::new(GlobalIdRewriter::new(cache, columns())));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let hook = Arc::clone(&hook);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..50 {
                    let sql = format!("INSERT INTO t (a) VALUES ({worker}), ({i})");
                    let mut tree = parse_statement(&sql).unwrap();
                    let root = tree.root();
                    let mut params = HookParams::new("app");
                    assert!(hook.run(&mut tree, root, &mut params).is_applied());
                    let values = tree.find_type(root, NodeType::VALUE_LIST).unwrap();
                    for &row in tree.children(values) {
                        let cell = *tree.children(row).last().unwrap();
                        ids.push(tree.name(cell).unwrap().parse::<u64>().unwrap());
                    }
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen, (1..=400).collect::<HashSet<u64>>());
}

#[test]
fn pipeline_runs_registered_hooks() {
    let registry = HookRegistry::new();
    let rewriter = GlobalIdRewriter::new(
        Arc::new(IdCache::with_store(Arc::new(MemoryStore::new()))),
        columns(),
    );
    register_global_id_hook(&registry, rewriter).unwrap();
    assert_eq!(registry.names(), vec![GLOBAL_ID_HOOK.to_string()]);

    let duplicate = register_global_id_hook(
        &registry,
        GlobalIdRewriter::new(
            Arc::new(IdCache::with_store(Arc::new(MemoryStore::new()))),
            columns(),
        ),
    );
    assert!(matches!(duplicate, Err(RegistryError::Duplicate(_))));

    assert!(matches!(
        HookPipeline::from_registry(&registry, &["missing"]),
        Err(RegistryError::Unknown(name)) if name == "missing"
    ));

    let pipeline = HookPipeline::from_registry(&registry, &[GLOBAL_ID_HOOK]).unwrap();
    assert_eq!(pipeline.names(), vec![GLOBAL_ID_HOOK]);

    let mut tree = parse_statement("INSERT INTO t (a) VALUES (7)").unwrap();
    let mut params = HookParams::new("app");
    let outcomes = pipeline.run(&mut tree, &mut params);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].1.is_applied());
    assert_eq!(render(&tree), "INSERT INTO t (a, gid) VALUES (7, 1)");
}

#[test]
fn pipeline_stops_after_failure() {
    struct Counting(&'static str, std::sync::atomic::AtomicUsize);

    impl StatementHook for Counting {
        fn name(&self) -> &str {
            self.0
        }

        fn run(
            &self,
            _tree: &mut StatementTree,
            _root: globid_sql::NodeId,
            _params: &mut HookParams,
        ) -> HookOutcome {
            self.1.fetch_add(1, Ordering::SeqCst);
            HookOutcome::Skipped(SkipReason::NotInsert)
        }
    }

    let registry = HookRegistry::new();
    register_global_id_hook(
        &registry,
        GlobalIdRewriter::new(
            Arc::new(IdCache::with_store(Arc::new(MemoryStore::new()))),
            columns(),
        ),
    )
    .unwrap();
    let after = Arc::new(Counting("after", Default::default()));
    registry.register(after.clone()).unwrap();

    let pipeline = HookPipeline::from_registry(&registry, &[GLOBAL_ID_HOOK, "after"]).unwrap();
    let mut tree = parse_statement("INSERT INTO nowhere (a) VALUES (1)").unwrap();
    let outcomes = pipeline.run(&mut tree, &mut HookParams::new("app"));

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].1.is_failure());
    assert_eq!(after.1.load(Ordering::SeqCst), 0);
}

#[test]
fn global_registry_is_shared() {
    let name = GLOBAL_ID_HOOK;
    let registry = HookRegistry::global();
    let _ = registry.unregister(name);
    register_global_id_hook(
        registry,
        GlobalIdRewriter::new(
            Arc::new(IdCache::with_store(Arc::new(MemoryStore::new()))),
            columns(),
        ),
    )
    .unwrap();
    assert!(HookRegistry::global().get(name).is_some());
    assert!(registry.unregister(name).is_some());
}

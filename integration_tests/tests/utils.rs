#![allow(dead_code)]

/// Send log output to the test harness, so it is shown for failing tests
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A script which counts calls to every hook
pub const COUNTING_HOOKS: &str = r#"
init_count = 0
sync_counts = {}
tick_count = 0

function OnInit()
    init_count = init_count + 1
end

function OnSync(count)
    table.insert(sync_counts, count)
end

function OnTick()
    tick_count = tick_count + 1
end
"#;

#![cfg(feature = "shuttle")]

mod common;

use shuttle::scheduler::RandomScheduler;
use shuttle::{Config, PortfolioRunner};
use std::fs::File;
use std::io::Read;
use test_log::test;

fn portfolio_test<F>(test: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let mut portfolio_runner = PortfolioRunner::new(true, Config::new());
    for _ in 0..32 {
        portfolio_runner.add(RandomScheduler::new(1000usize));
    }
    portfolio_runner.run(test);
}

#[test]
fn four_thread_copy_and_assign_shuttle_test() {
    portfolio_test(|| common::copy_and_assign_test(4, 10));
}

#[test]
fn promote_while_releasing_shuttle_test() {
    portfolio_test(|| common::promote_while_releasing_test(4));
}

#[test]
fn four_thread_weak_churn_shuttle_test() {
    portfolio_test(|| common::weak_churn_test(4, 10));
}

#[test]
fn four_thread_reassignment_shuttle_test() {
    portfolio_test(|| common::concurrent_reassignment_test(4, 10));
}

#[test]
fn four_thread_publish_before_release_shuttle_test() {
    portfolio_test(|| common::publish_before_release_test(4));
}

/// Replay a schedule printed by a failing shuttle run, e.g. `replay_test("failure.txt")`.
#[allow(dead_code)]
fn replay_test(path_to_failing_iteration: &str) {
    let mut file: File = File::open(path_to_failing_iteration).unwrap();
    let mut replay_string: String = String::new();
    file.read_to_string(&mut replay_string).unwrap();
    shuttle::replay(
        || {
            common::promote_while_releasing_test(4);
        },
        &*replay_string,
    );
}

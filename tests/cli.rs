use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

#[test]
fn new_then_drop() -> Result<()> {
    let data_dir = assert_fs::TempDir::new()?;

    cargo_run!("imseek", "-d", data_dir.path(), "new", "cats").success();
    // 重复创建需要 --force
    cargo_run!("imseek", "-d", data_dir.path(), "new", "cats")
        .failure()
        .stderr(predicate::str::contains("已存在"));
    cargo_run!("imseek", "-d", data_dir.path(), "new", "cats", "--force").success();

    cargo_run!("imseek", "-d", data_dir.path(), "drop", "cats").success();
    assert!(!data_dir.path().join("cats").exists());

    cargo_run!("imseek", "-d", data_dir.path(), "drop", "cats")
        .failure()
        .stderr(predicate::str::contains("不存在"));

    Ok(())
}

// 集合检查发生在读取图片之前，传入任意文件即可触发
#[test]
fn search_unknown_collection_fails() -> Result<()> {
    let data_dir = assert_fs::TempDir::new()?;

    cargo_run!("imseek", "-d", data_dir.path(), "search", "nope", "Cargo.toml")
        .failure()
        .stderr(predicate::str::contains("不存在"));

    Ok(())
}

#[test]
fn add_missing_collection_fails() -> Result<()> {
    let data_dir = assert_fs::TempDir::new()?;

    cargo_run!("imseek", "-d", data_dir.path(), "add", "nope", "tests")
        .failure()
        .stderr(predicate::str::contains("不存在"));

    Ok(())
}

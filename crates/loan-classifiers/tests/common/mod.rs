//! Synthetic loan tables written as CSV.
#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const GRADES: [&str; 3] = ["A", "B", "C"];

/// Balanced labels, starting with a defaulter.
pub fn label(i: usize) -> usize {
    usize::from(i % 4 < 2)
}

/// One defaulter in five, starting with a repaid loan.
pub fn rare_label(i: usize) -> usize {
    usize::from(i % 5 == 4)
}

/// `customer_id,income,debt_ratio,grade,loan_status`; defaulters earn less
/// and carry more debt.
pub fn baseline_csv(n: usize, offset: usize) -> String {
    baseline_csv_with(n, offset, label)
}

pub fn baseline_csv_with(n: usize, offset: usize, label: fn(usize) -> usize) -> String {
    let mut out = String::from("customer_id,income,debt_ratio,grade,loan_status\n");
    for i in 0..n {
        let id = i + offset;
        let y = label(id);
        let income = (if y == 1 { 30.0 } else { 60.0 }) + (id % 10) as f64;
        let debt = (if y == 1 { 0.6 } else { 0.2 }) + (id % 5) as f64 / 50.0;
        writeln!(out, "C{},{},{:.3},{},{}", id, income, debt, GRADES[id % 3], y).unwrap();
    }
    out
}

/// Adds an `opened` date column and some missing cells.
pub fn enhanced_csv(n: usize, offset: usize) -> String {
    enhanced_csv_with(n, offset, label)
}

pub fn enhanced_csv_with(n: usize, offset: usize, label: fn(usize) -> usize) -> String {
    let mut out = String::from("customer_id,income,debt_ratio,grade,opened,loan_status\n");
    for i in 0..n {
        let id = i + offset;
        let y = label(id);
        let income = if id % 11 == 3 {
            String::new()
        } else {
            format!("{}", (if y == 1 { 30.0 } else { 60.0 }) + (id % 10) as f64)
        };
        let debt = (if y == 1 { 0.6 } else { 0.2 }) + (id % 5) as f64 / 50.0;
        let grade = if id % 13 == 5 { "" } else { GRADES[id % 3] };
        let opened = if id % 17 == 2 {
            String::new()
        } else {
            format!("20{:02}-{:02}-{:02}", 15 + id % 8, 1 + id % 12, 1 + id % 28)
        };
        writeln!(out, "C{},{},{:.3},{},{},{}", id, income, debt, grade, opened, y).unwrap();
    }
    out
}

pub fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// Train (100 rows) and test (20 rows) files in `dir`.
pub fn write_baseline(dir: &Path) -> (PathBuf, PathBuf) {
    (
        write(dir, "train.csv", &baseline_csv(100, 0)),
        write(dir, "test.csv", &baseline_csv(20, 100)),
    )
}

pub fn write_enhanced(dir: &Path) -> (PathBuf, PathBuf) {
    (
        write(dir, "train.csv", &enhanced_csv(100, 0)),
        write(dir, "test.csv", &enhanced_csv(20, 100)),
    )
}

/// Imbalanced train (100 rows) and test (20 rows) files whose first row is
/// a repaid loan.
pub fn write_rare_baseline(dir: &Path) -> (PathBuf, PathBuf) {
    (
        write(dir, "train.csv", &baseline_csv_with(100, 0, rare_label)),
        write(dir, "test.csv", &baseline_csv_with(20, 100, rare_label)),
    )
}

pub fn write_rare_enhanced(dir: &Path) -> (PathBuf, PathBuf) {
    (
        write(dir, "train.csv", &enhanced_csv_with(100, 0, rare_label)),
        write(dir, "test.csv", &enhanced_csv_with(20, 100, rare_label)),
    )
}

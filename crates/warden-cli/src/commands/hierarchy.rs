//! Hierarchy command - shows which prefixes a hierarchical pattern can match.

use warden_abac::resolve_hierarchy;

pub fn run(path: &str) {
    for level in resolve_hierarchy(path) {
        println!("{level}");
    }
}

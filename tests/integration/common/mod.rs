#![allow(dead_code)]

use std::{fs, path::Path, path::PathBuf};

use upstart::job::JobBuilder;

/// Rendered job split into lines.
pub fn rendered_lines(job: &JobBuilder) -> Vec<String> {
    job.render()
        .expect("job should render")
        .lines()
        .map(|line| line.to_string())
        .collect()
}

/// Keywords of every single-line directive, in output order.
pub fn keywords(job: &JobBuilder) -> Vec<String> {
    job.document()
        .iter()
        .map(|(directive, _)| directive.keyword().into_owned())
        .collect()
}

/// Writes `content` to `<dir>/<name>` and returns its path.
pub fn write_manifest(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("failed to write manifest");
    path
}

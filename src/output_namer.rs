//! Picking the file name of the merged manual.

use std::path::{Path, PathBuf};

use slug::slugify;
use url::Url;

/// Existence check used for collision handling.
pub trait FileProbe {
    fn exists(&self, path: &Path) -> bool;
}

/// Checks the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileProbe for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Derives `manual_page1` from `https://doc.example.com/manual/page1`.
///
/// Path segments after the host are percent-decoded and joined with `_`. Dots
/// become `-` and any other character unsafe in a file name is replaced with `-`. A bare host
/// falls back to its slug.
pub fn base_name(start: &Url) -> String {
    let segments: Vec<String> = start
        .path()
        .trim_end_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match urlencoding::decode(segment) {
            Ok(decoded) => normalize_segment(&decoded),
            Err(_) => normalize_segment(segment),
        })
        .filter(|segment| !segment.is_empty())
        .collect();

    if !segments.is_empty() {
        return segments.join("_");
    }

    match start.host_str() {
        Some(host) if !slugify(host).is_empty() => slugify(host),
        _ => "output".to_string(),
    }
}

fn normalize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '.' => '-',
            c if c.is_alphanumeric() || matches!(c, '-' | '_') => c,
            _ => '-',
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Chooses a free `<base>.pdf` in `dir`, trying `<base>(1).pdf`, `<base>(2).pdf`, ...
/// Call it right before writing: the answer is only as fresh as the probe.
pub fn name_for(start: &Url, dir: &Path, probe: &dyn FileProbe) -> PathBuf {
    let base = base_name(start);
    let candidate = dir.join(format!("{base}.pdf"));
    if !probe.exists(&candidate) {
        return candidate;
    }

    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{base}({counter}).pdf"));
        if !probe.exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

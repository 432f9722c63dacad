//! Writing published artifacts: pages, `sitemap.txt`, `site.webmanifest`,
//! the `robots.txt` sitemap line, and the static directory mirror.
//!
//! Site-wide files are written only when their contents change, so an
//! unchanged rebuild leaves their modification times alone.

use crate::config::{ManifestIcon, SiteMetadata};
use crate::image_cache::copy_if_newer;
use crate::nodes::artifact_path;
use crate::paths::{is_path_char, relative_slash_path};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const SITEMAP_FILENAME: &str = "sitemap.txt";
pub const MANIFEST_FILENAME: &str = "site.webmanifest";
pub const ROBOTS_FILENAME: &str = "robots.txt";

/// Write `contents` to `output_path` (rooted, e.g. `/blog/a.html`) under
/// `dir`, creating parent directories.
pub fn write_artifact(dir: &Path, output_path: &str, contents: &str) -> io::Result<PathBuf> {
    let path = artifact_path(dir, output_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

/// Write `contents` unless the file already holds exactly that. Returns
/// whether a write happened.
pub fn write_if_changed(path: &Path, contents: &str) -> io::Result<bool> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(true)
}

/// Whether an output path can appear in a URL unescaped.
pub fn is_href_legal(output_path: &str) -> bool {
    !output_path.is_empty() && output_path.chars().all(is_path_char)
}

/// One absolute URL per line, sorted. Paths that are not href-legal are
/// left out.
pub fn sitemap<'a>(site_url: &str, output_paths: impl IntoIterator<Item = &'a str>) -> String {
    let base = site_url.trim_end_matches('/');
    let urls: BTreeSet<String> = output_paths
        .into_iter()
        .filter(|p| is_href_legal(p))
        .map(|p| format!("{base}/{}", p.trim_start_matches('/')))
        .collect();
    urls.into_iter().collect::<Vec<_>>().join("\n")
}

/// Append `Sitemap: <url>` to `robots.txt` in `public_dir` if the file
/// exists and has no such line yet. Returns whether the file changed.
pub fn register_sitemap(public_dir: &Path, sitemap_url: &str) -> io::Result<bool> {
    let robots = public_dir.join(ROBOTS_FILENAME);
    let content = match fs::read_to_string(&robots) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let line = format!("Sitemap: {sitemap_url}");
    if content.lines().any(|l| l.trim() == line) {
        return Ok(false);
    }
    let separator = if content.is_empty() || content.ends_with('\n') { "" } else { "\n" };
    fs::write(&robots, format!("{content}{separator}{line}\n"))?;
    Ok(true)
}

#[derive(Serialize)]
struct WebManifest<'a> {
    name: &'a str,
    short_name: &'a str,
    description: &'a str,
    start_url: &'a str,
    display: &'a str,
    theme_color: &'a str,
    background_color: &'a str,
    icons: &'a [ManifestIcon],
}

/// The web app manifest as pretty-printed JSON.
pub fn web_manifest(site: &SiteMetadata) -> Result<String, serde_json::Error> {
    let short_name = if site.short_name.is_empty() {
        &site.name
    } else {
        &site.short_name
    };
    serde_json::to_string_pretty(&WebManifest {
        name: &site.name,
        short_name,
        description: &site.description,
        start_url: "/",
        display: &site.display,
        theme_color: &site.theme_color,
        background_color: &site.background_color,
        icons: &site.icons,
    })
}

/// Counts from one [`mirror_dir`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub copied: usize,
    pub fresh: usize,
    pub pruned: usize,
}

/// Make `dest` a copy of `src`: copy files that are newer, delete files that
/// no longer exist in `src`. A missing `src` mirrors nothing.
pub fn mirror_dir(src: &Path, dest: &Path) -> io::Result<MirrorStats> {
    let mut stats = MirrorStats::default();
    if !src.is_dir() {
        return Ok(stats);
    }

    let mut wanted = BTreeSet::new();
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_slash_path(entry.path(), src);
        if copy_if_newer(entry.path(), &dest.join(&rel))? {
            stats.copied += 1;
        } else {
            stats.fresh += 1;
        }
        wanted.insert(rel);
    }

    if dest.is_dir() {
        for entry in WalkDir::new(dest) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file()
                && !wanted.contains(&relative_slash_path(entry.path(), dest))
            {
                debug!(file = %entry.path().display(), "pruning");
                fs::remove_file(entry.path())?;
                stats.pruned += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_artifact_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let path = write_artifact(tmp.path(), "/blog/2021/a.html", "<p>a</p>").unwrap();
        assert_eq!(path, tmp.path().join("blog/2021/a.html"));
        assert_eq!(fs::read_to_string(path).unwrap(), "<p>a</p>");
    }

    #[test]
    fn write_if_changed_skips_identical_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sitemap.txt");
        assert!(write_if_changed(&path, "a").unwrap());
        assert!(!write_if_changed(&path, "a").unwrap());
        assert!(write_if_changed(&path, "b").unwrap());
    }

    #[test]
    fn sitemap_lists_legal_paths_sorted() {
        let text = sitemap(
            "https://example.com/",
            ["/b.html", "/a.html", "/has space.html", "/a.html"],
        );
        assert_eq!(text, "https://example.com/a.html\nhttps://example.com/b.html");
    }

    #[test]
    fn robots_gets_sitemap_line_once() {
        let tmp = TempDir::new().unwrap();
        assert!(!register_sitemap(tmp.path(), "https://x.org/sitemap.txt").unwrap());

        let robots = tmp.path().join(ROBOTS_FILENAME);
        fs::write(&robots, "User-agent: *\nDisallow:").unwrap();
        assert!(register_sitemap(tmp.path(), "https://x.org/sitemap.txt").unwrap());
        assert!(!register_sitemap(tmp.path(), "https://x.org/sitemap.txt").unwrap());
        assert_eq!(
            fs::read_to_string(&robots).unwrap(),
            "User-agent: *\nDisallow:\nSitemap: https://x.org/sitemap.txt\n"
        );
    }

    #[test]
    fn manifest_uses_site_fields() {
        let site = SiteMetadata {
            name: "My Site".into(),
            theme_color: "#000".into(),
            icons: vec![ManifestIcon {
                src: "/static/icon.png".into(),
                sizes: "192x192".into(),
                mime: "image/png".into(),
            }],
            ..SiteMetadata::default()
        };
        let json: serde_json::Value = serde_json::from_str(&web_manifest(&site).unwrap()).unwrap();
        assert_eq!(json["name"], "My Site");
        assert_eq!(json["short_name"], "My Site");
        assert_eq!(json["start_url"], "/");
        assert_eq!(json["icons"][0]["type"], "image/png");
    }

    #[test]
    fn mirror_copies_and_prunes() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("static");
        let dest = tmp.path().join("public/static");
        fs::create_dir_all(src.join("css")).unwrap();
        fs::write(src.join("css/site.css"), "body{}").unwrap();
        fs::write(src.join("robots.txt"), "User-agent: *").unwrap();

        let stats = mirror_dir(&src, &dest).unwrap();
        assert_eq!(stats.copied, 2);
        assert_eq!(fs::read_to_string(dest.join("css/site.css")).unwrap(), "body{}");

        fs::remove_file(src.join("robots.txt")).unwrap();
        let stats = mirror_dir(&src, &dest).unwrap();
        assert_eq!(stats, MirrorStats { copied: 0, fresh: 1, pruned: 1 });
        assert!(!dest.join("robots.txt").exists());
    }

    #[test]
    fn mirror_of_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let stats = mirror_dir(&tmp.path().join("nope"), &tmp.path().join("out")).unwrap();
        assert_eq!(stats, MirrorStats::default());
    }
}

//! End-to-end builds through the public API with the real image backend.

use sitewright::config::load_config;
use sitewright::engine::BuildEngine;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const SITE_TOML: &str = r#"
[site]
url = "https://photos.example.org/"
name = "Field Notes"

[images]
max_width = 64
max_height = 64
tiny_size = 8
alternate_formats = ["webp", "png"]

[dynamic]
per_page = 2

[[post_processing.plugins]]
use = "heading-ids"
priority = 40

[[post_processing.plugins]]
use = "external-noopener"
priority = 30
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("{rel}: {e}"))
}

fn write_jpeg(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 2) as u8, (y * 2) as u8, 128])
    });
    img.save(path).unwrap();
}

fn set_mtime(path: &Path, time: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "site.toml", SITE_TOML);
    write(
        root,
        "src/content/index.md",
        "# Home\n\nLatest in [the journal](/blog/index.dynamic). \
         Source on [GitHub](https://github.com/example/notes).",
    );
    for (i, date) in ["2024-01-05", "2024-02-11", "2024-03-20"].iter().enumerate() {
        write(
            root,
            &format!("src/content/blog/entry-{i}.md"),
            &format!(
                "---\ntitle: Entry {i}\ndate: {date}\ntags: [Birds]\n---\n\n## Sightings\n\n![Heron](img/heron.jpg)\n"
            ),
        );
    }
    write(
        root,
        "src/content/contact.page",
        "template: Default\ntitle: Contact\npath: get-in-touch\n",
    );
    write_jpeg(&root.join("src/content/blog/img/heron.jpg"), 128, 96);
    write(root, "src/content/robots.txt", "User-agent: *\n");
    write(root, "src/static/site.css", "main{max-width:40rem}");
    tmp
}

fn engine(root: &Path) -> BuildEngine {
    BuildEngine::new(load_config(root).unwrap(), root)
}

#[test]
fn full_build_produces_the_site() {
    let tmp = project();
    let root = tmp.path();
    let summary = engine(root).build().unwrap();
    assert_eq!(summary.failed(), 0, "{summary:?}");

    let index = read(root, "public/index.html");
    assert!(index.contains(r#"href="/blog/index.html""#), "{index}");
    assert!(index.contains(r#"target="_blank""#));
    assert!(index.contains(r#"rel="noopener noreferrer""#));
    assert!(index.contains("<title>Home | Field Notes</title>"));

    let entry = read(root, "public/blog/entry-0.html");
    assert!(entry.contains(r#"id="sightings""#), "{entry}");
    assert!(entry.contains("<picture>"), "{entry}");
    assert!(entry.contains(r#"srcset="/blog/img/heron.webp""#), "{entry}");
    assert!(entry.contains(r#"width="64""#) && entry.contains(r#"height="48""#), "{entry}");

    for variant in ["heron.jpg", "heron.webp", "heron.png", "heron__tiny.jpg"] {
        assert!(
            root.join("public/blog/img").join(variant).exists(),
            "missing {variant}"
        );
    }
    let (w, h) = image::image_dimensions(root.join("public/blog/img/heron.jpg")).unwrap();
    assert_eq!((w, h), (64, 48));

    assert!(root.join("public/get-in-touch.html").exists());
    assert!(root.join("public/blog/page-2.html").exists());
    assert_eq!(read(root, "public/static/site.css"), "main{max-width:40rem}");

    let sitemap = read(root, "public/sitemap.txt");
    assert!(sitemap.contains("https://photos.example.org/blog/entry-2.html"));
    assert!(sitemap.contains("https://photos.example.org/get-in-touch.html"));
    assert!(
        read(root, "public/robots.txt")
            .contains("Sitemap: https://photos.example.org/sitemap.txt")
    );
    let manifest: serde_json::Value =
        serde_json::from_str(&read(root, "public/site.webmanifest")).unwrap();
    assert_eq!(manifest["name"], "Field Notes");
}

#[test]
fn unchanged_rebuild_writes_nothing_new() {
    let tmp = project();
    let root = tmp.path();
    let mut engine = engine(root);
    engine.build().unwrap();

    // Age every output so a rewrite would be visible as a fresh mtime.
    let past = SystemTime::now() - Duration::from_secs(3600);
    let outputs = [
        "public/blog/entry-0.html",
        "public/blog/img/heron.jpg",
        "public/sitemap.txt",
        "public/static/site.css",
        ".sitewright/rendered/blog/entry-0.html",
    ];
    for rel in outputs {
        set_mtime(&root.join(rel), past);
    }
    // Sources must stay older than their outputs.
    let older = past - Duration::from_secs(3600);
    set_mtime(&root.join("src/content/blog/img/heron.jpg"), older);
    set_mtime(&root.join("src/static/site.css"), older);

    let summary = engine.build().unwrap();
    assert_eq!(summary.phase("render").unwrap().succeeded, 0);
    assert_eq!(summary.phase("publish").unwrap().succeeded, 0);
    for rel in outputs {
        let modified = fs::metadata(root.join(rel)).unwrap().modified().unwrap();
        assert_eq!(modified, past, "{rel} was rewritten");
    }
}

#[test]
fn fresh_engine_reuses_the_bundle_cache() {
    let tmp = project();
    let root = tmp.path();
    engine(root).build().unwrap();
    assert!(root.join(".sitewright/.bundle-cache.json").exists());

    // A new process renders everything again, but from identical sources.
    let before = read(root, "public/blog/entry-1.html");
    let summary = engine(root).build().unwrap();
    assert_eq!(summary.failed(), 0);
    assert_eq!(read(root, "public/blog/entry-1.html"), before);
}

#[test]
fn renamed_post_moves_its_output() {
    let tmp = project();
    let root = tmp.path();
    let mut engine = engine(root);
    engine.build().unwrap();

    fs::rename(
        root.join("src/content/blog/entry-2.md"),
        root.join("src/content/blog/latest.md"),
    )
    .unwrap();
    let summary = engine.build().unwrap();
    assert_eq!(summary.failed(), 0);
    assert!(!root.join("public/blog/entry-2.html").exists());
    assert!(root.join("public/blog/latest.html").exists());
    assert!(read(root, "public/blog/index.html").contains(r#"href="/blog/latest.html""#));
    assert!(!read(root, "public/sitemap.txt").contains("entry-2"));
}

//! Plain-text rendering for the query commands.

use std::fmt::Write;

use detergent_core::{CatalogStats, TimelineBucket, Torrent, TorrentMetadata};

const UNRESOLVED: &str = "-- unresolved --";

/// `announce_count name magnet`, one torrent per line.
pub fn torrent_line(torrent: &Torrent) -> String {
    format!(
        "{:<9} {:<80} {}",
        torrent.announce_count,
        torrent.name.as_deref().unwrap_or(UNRESOLVED),
        torrent.info_hash.magnet_uri()
    )
}

pub fn torrent_list(torrents: &[Torrent]) -> String {
    let mut out = String::new();
    for torrent in torrents {
        out.push_str(&torrent_line(torrent));
        out.push('\n');
    }
    out
}

/// Each non-empty day under an underlined date header.
pub fn timeline(buckets: &[TimelineBucket]) -> String {
    let mut out = String::new();
    for bucket in buckets.iter().filter(|b| !b.torrents.is_empty()) {
        let header = bucket.day.format("%A %Y-%m-%d").to_string();
        let _ = writeln!(out, "{}", header);
        let _ = writeln!(out, "{}", "-".repeat(header.len()));
        out.push_str(&torrent_list(&bucket.torrents));
        out.push('\n');
    }
    out
}

pub fn stats(stats: &CatalogStats) -> String {
    format!(
        "Torrents:  {}\nResolved:  {}\nAnnounces: {}\n",
        stats.total_torrents, stats.total_resolved, stats.total_announces
    )
}

pub fn metadata(metadata: &TorrentMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:   {}", metadata.display_name());
    let _ = writeln!(out, "Size:   {}", human_size(metadata.length));
    let _ = writeln!(out, "Magnet: {}", metadata.info_hash.magnet_uri());
    if metadata.is_multi_file() {
        let _ = writeln!(out, "Files:");
        for file in &metadata.files {
            let _ = writeln!(out, "  {:>10}  {}", human_size(file.length), file.path);
        }
    }
    out
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use detergent_core::testing::fixtures;

    fn torrent(byte: u8, name: Option<&str>, announce_count: u64) -> Torrent {
        Torrent {
            info_hash: fixtures::info_hash(byte),
            name: name.map(str::to_string),
            length: 0,
            announce_count,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn test_torrent_line_layout() {
        let line = torrent_line(&torrent(0xaa, Some("Ubuntu ISO"), 42));
        assert!(line.starts_with("42        Ubuntu ISO"));
        assert!(line.ends_with(&format!("magnet:?xt=urn:btih:{}", "aa".repeat(20))));
        assert_eq!(line.find("magnet:"), Some(91));
    }

    #[test]
    fn test_unresolved_placeholder() {
        assert!(torrent_line(&torrent(1, None, 0)).contains("-- unresolved --"));
    }

    #[test]
    fn test_timeline_skips_empty_days() {
        let buckets = vec![
            TimelineBucket {
                day: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                torrents: vec![torrent(1, Some("a"), 1)],
            },
            TimelineBucket {
                day: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                torrents: vec![],
            },
        ];

        let out = timeline(&buckets);
        assert!(out.starts_with("Saturday 2024-03-02\n-------------------\n"));
        assert!(!out.contains("2024-03-01"));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(734_003_200), "700.0 MiB");
    }

    #[test]
    fn test_metadata_lists_files_for_multi_file() {
        let meta = fixtures::multi_file_metadata(
            fixtures::info_hash(2),
            "Album",
            &[("01.flac", 2048)],
        );
        let out = metadata(&meta);
        assert!(out.contains("Name:   Album"));
        assert!(out.contains("Album/01.flac"));
    }
}

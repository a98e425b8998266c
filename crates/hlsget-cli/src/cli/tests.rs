use super::*;

#[test]
fn parses_all_flags() {
    let cli = Cli::parse_from([
        "hlsget",
        "-u",
        "http://host/vod/list.m3u8",
        "-o",
        "show.mp4",
        "-d",
        "/tmp",
        "-n",
        "8",
        "-r",
        "3",
        "-t",
        "30",
        "--proxy",
        "socks5://localhost:1080",
        "-b",
        "http://cdn/media/",
    ]);
    assert_eq!(cli.url.as_deref(), Some("http://host/vod/list.m3u8"));
    assert_eq!(cli.output, "show.mp4");
    assert_eq!(cli.dir, Some(PathBuf::from("/tmp")));
    assert_eq!(cli.concurrency, Some(8));
    assert_eq!(cli.retry, Some(3));
    assert_eq!(cli.timeout, Some(30));
    assert_eq!(cli.proxy.as_deref(), Some("socks5://localhost:1080"));
    assert_eq!(cli.base_url.as_deref(), Some("http://cdn/media/"));
    assert!(cli.input.is_none());
}

#[test]
fn output_name_has_a_default() {
    let cli = Cli::parse_from(["hlsget", "-u", "http://host/list.m3u8"]);
    assert_eq!(cli.output, "output.mp4");
    assert!(cli.dir.is_none());
    assert!(cli.concurrency.is_none());
}

#[test]
fn accepts_local_playlist_file() {
    let cli = Cli::parse_from(["hlsget", "-i", "/data/list.m3u8"]);
    assert!(cli.url.is_none());
    assert_eq!(cli.input, Some(PathBuf::from("/data/list.m3u8")));
}

#[test]
fn fmt_bytes_scales_units() {
    assert_eq!(fmt_bytes(0), "0 B");
    assert_eq!(fmt_bytes(512), "512 B");
    assert_eq!(fmt_bytes(2048), "2.00 KiB");
    assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.00 MiB");
    assert_eq!(fmt_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
}

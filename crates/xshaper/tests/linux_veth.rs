#[cfg(target_os = "linux")]
mod linux_veth {
    use std::path::Path;
    use std::time::Duration;

    use xshaper::builder::find_xdp_object;
    use xshaper::config::AttachMode;
    use xshaper::{ShaperBuilder, ShaperError};
    use xshaper_core::sys::limits::is_privileged;
    use xshaper_core::sys::utils::if_nametoindex;

    // Needs root, a `veth0`/`veth1` pair that is up, and the redirect program
    // built for bpfel-unknown-none. Returns early otherwise.
    fn environment_ready() -> bool {
        if !is_privileged() {
            eprintln!("skipping: not running as root");
            return false;
        }
        if !Path::new("/sys/class/net/veth0").exists() {
            eprintln!("skipping: veth0 not present");
            return false;
        }
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        if find_xdp_object(&workspace).is_none() {
            eprintln!("skipping: redirect program not built");
            return false;
        }
        true
    }

    #[test]
    fn test_veth_shaper_starts_and_steps() {
        if !environment_ready() {
            return;
        }
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let object = find_xdp_object(&workspace).unwrap();

        let mut shaper = ShaperBuilder::new("veth0")
            .queue_id(0)
            .attach_mode(AttachMode::Generic)
            .delay(Duration::from_millis(1))
            .frame_count(64)
            .xdp_object(object)
            .build()
            .expect("failed to build shaper on veth0");

        assert!(shaper.link().has_program());
        assert_eq!(shaper.link().ifindex(), if_nametoindex("veth0").unwrap());
        assert_eq!(shaper.link().queue_id(), 0);
        assert_eq!(shaper.frames_total(), 64);
        for _ in 0..100 {
            shaper.step().unwrap();
        }
        let stats = shaper.stats();
        assert_eq!(stats.received, stats.dropped + stats.delayed);
        assert!(shaper.link().statistics().is_ok());
    }

    #[test]
    fn test_missing_program_is_reported() {
        if !environment_ready() {
            return;
        }
        let result = ShaperBuilder::new("veth0")
            .attach_mode(AttachMode::Generic)
            .frame_count(64)
            .xdp_object("/nonexistent/xshaper.o")
            .build_raw();
        assert!(matches!(result, Err(ShaperError::EbpfLoad(_))));
    }
}

pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let eyre_panic_hook = color_eyre::config::HookBuilder::default().display_location_section(
            std::env::var("RUST_ERR_LOCATION")
                .map(|var| var != "0")
                .unwrap_or(true),
        );

        #[cfg(not(debug_assertions))]
        let eyre_panic_hook = eyre_panic_hook.panic_section(format!(
            r#"Sake has panicked. This is a bug, please report it.
If you can reliably reproduce this panic, try to include the
following items in your report:
- Reproduction steps
- The offending definition file, if any
- A panic backtrace. Set the following environment variables as shown to enable full backtraces.
    - RUST_BACKTRACE=1
    - RUST_LIB_BACKTRACE=full
    - RUST_SPANTRACE=1
Platform: {platform}
Version: {version}
Args: {args:?}
"#,
            platform = crate::build::BUILD_TARGET,
            version = crate::build::PKG_VERSION,
            args = std::env::args().collect::<Vec<_>>()
        ));

        match eyre_panic_hook.try_into_hooks() {
            Ok((panic_hook, eyre_hook)) => {
                let panic_hook = panic_hook.into_panic_hook();
                std::panic::set_hook(Box::new(move |panic_info| {
                    panic_hook(panic_info);
                }));
                if let Err(err) = eyre_hook.install() {
                    eprintln!("error installing eyre hook: {err}");
                }
            }
            Err(err) => eprintln!("error building eyre hooks: {err}"),
        }

        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "info");
        }
        #[cfg(not(debug_assertions))]
        if std::env::var("RUST_SPANTRACE").is_err() {
            std::env::set_var("RUST_SPANTRACE", "0");
        }

        use tracing_subscriber::prelude::*;

        let fmt = tracing_subscriber::fmt::layer()
            .without_time()
            .with_writer(std::io::stderr)
            .with_target(false);

        #[cfg(debug_assertions)]
        let fmt = fmt.with_target(true);

        let filter = tracing_subscriber::EnvFilter::from_default_env();

        let registry = tracing_subscriber::registry()
            // filter on values from RUST_LOG
            .with(filter)
            // subscriber that emits to stderr
            .with(fmt)
            // instrument errors with SpanTraces, used by color-eyre
            .with(tracing_error::ErrorLayer::default());

        // a subscriber installed by a test harness wins
        let _ = registry.try_init();
    });
}

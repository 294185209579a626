use std::io;
use tokio::runtime::Runtime;
use tracing::info;

/// Multi-threaded runtime, with `threads` workers when given.
pub fn build(threads: Option<usize>, thread_name: &str) -> io::Result<Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name(thread_name);
    if let Some(threads) = threads.filter(|threads| *threads > 0) {
        info!("custom runtime threads: {}", threads);
        builder.worker_threads(threads);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_custom_threads() {
        let runtime = build(Some(2), "test-worker").unwrap();
        let name = runtime.block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_string) })
                .await
                .unwrap()
        });
        assert_eq!(name.as_deref(), Some("test-worker"));
    }

    #[test]
    fn build_ignores_zero_threads() {
        assert!(build(Some(0), "test-worker").is_ok());
    }
}

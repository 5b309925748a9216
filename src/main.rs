use std::sync::atomic::{AtomicBool, Ordering};

use kurl::signals;
use kurl::status::ExitStatus;

/// Entry point - catches Ctrl+C and calls core::run()
fn main() -> ExitStatus {
    // Ctrl+C stops the tunnel instead of exiting, so the local port is released
    ctrlc::set_handler(move || {
        signals::set_interrupted();
        eprintln!("\nInterrupted");

        // On second Ctrl+C, force exit
        static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);
        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
    .ok();

    let args: Vec<String> = std::env::args().collect();
    kurl::core::run(args)
}

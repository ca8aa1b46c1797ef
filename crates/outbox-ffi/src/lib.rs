//! UniFFI bindings crate for the outbox library
//!
//! Wraps the outbox crate for UniFFI library mode binding generation so that
//! iOS and Android hosts can enqueue mutations, report connectivity and
//! perform the remote writes through a callback.
//!
//! ## Building for Swift
//!
//! 1. Build the library for Apple platforms:
//!    ```bash
//!    cargo build --release -p outbox-ffi --target aarch64-apple-ios
//!    cargo build --release -p outbox-ffi --target aarch64-apple-ios-sim
//!    ```
//!
//! 2. Generate Swift bindings:
//!    ```bash
//!    cargo run -p outbox-ffi --features bindgen --bin uniffi-bindgen generate \
//!        --library target/aarch64-apple-ios/release/liboutbox_ffi.a \
//!        --language swift \
//!        --out-dir generated/swift
//!    ```
//!
//! Kotlin bindings are generated the same way with `--language kotlin`
//! against the Android `.so`.

pub use outbox::ffi::*;

// Library mode needs the scaffolding from the crate that declared it
outbox::uniffi_reexport_scaffolding!();

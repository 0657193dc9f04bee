#![allow(clippy::needless_doctest_main)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables, unused_imports))
))]

//! `#[rondo::main]` and `#[rondo::test]`: run an `async fn` to completion on
//! a fresh local runtime.

mod entry;
mod parse;

use entry::Entry;

/// Runs an `async fn main` on a new local runtime.
///
/// The function body becomes the root future of the runtime, and the process
/// exits once it completes. Functions named `main` cannot take arguments.
///
/// Options map one to one to `rondo::runtime::Builder` calls:
///
/// - `start_paused = bool`: run on the paused clock.
/// - `blocking_threads = int`: size of the pool behind `spawn_blocking`.
///
/// ```rust
/// #[rondo::main(blocking_threads = 2)]
/// async fn main() -> rondo::Result<()> {
///     let answer = rondo::spawn_blocking(|| 42).await?;
///     println!("{answer}");
///     Ok(())
/// }
/// ```
///
/// expands to roughly:
///
/// ```rust
/// fn main() -> rondo::Result<()> {
///     rondo::runtime::Builder::new_local()
///         .blocking_threads(2)
///         .try_build()
///         .expect("Failed building the Runtime")
///         .block_on(async {
///             let answer = rondo::spawn_blocking(|| 42).await?;
///             println!("{answer}");
///             Ok(())
///         })
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::expand(Entry::Main, args.into(), item.into()).into()
}

/// Like [`macro@main`], for tests. Every test builds its own runtime on the
/// test thread.
///
/// Bodies may return `()` or a `Result`. With `rstest`, put `#[rstest]`
/// first so that each case gets expanded by this macro.
///
/// ```no_run
/// use std::time::Duration;
///
/// #[rondo::test(start_paused = true)]
/// async fn sleeps_are_instant() -> rondo::Result<()> {
///     let start = rondo::time::now();
///     rondo::time::sleep(Duration::from_secs(60)).await?;
///     assert_eq!(rondo::time::now() - start, Duration::from_secs(60));
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::expand(Entry::Test, args.into(), item.into()).into()
}

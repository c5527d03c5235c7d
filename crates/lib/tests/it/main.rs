/*! Integration tests for superscore.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - backend: Tests shared by every Backend implementation, plus per-backend storage details
 * - client: Tests for the Client's writability policy, search, snapshots and configuration
 * - control: Tests for the ControlLayer and TaskStatus against the local shim
 * - entry: Tests for the Entry model over the fixture data
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("superscore=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod backend;
mod client;
mod control;
mod entry;
mod helpers;

/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `serve`     -- build the application and run the web server
- `diagnose`  -- `check-config` and `discover`, for setup and troubleshooting

Handlers are small and compose the library components: configuration, the
auth facade and the web shell.
*/

pub mod diagnose;
pub mod serve;

use std::path::Path;

use shapewire_schema::References;
#[cfg(unix)]
use shapewire_transport::UdsTransport;

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::Result;
use crate::route::Routes;

/// Build a channel over a Unix domain socket at `path` and start connecting.
///
/// A peer that is not listening yet is not an error: the channel buffers
/// requests and keeps retrying with backoff.
#[cfg(unix)]
pub fn connect(
    path: impl AsRef<Path>,
    routes: &Routes,
    references: &References,
    config: ChannelConfig,
) -> Result<Channel<UdsTransport>> {
    let mut channel = Channel::with_config(UdsTransport::new(path), config);
    channel.add_routes(routes)?;
    channel.references_mut().extend(references);
    Ok(channel)
}

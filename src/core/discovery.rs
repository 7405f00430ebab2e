//! Host discovery policy: which of the announced hosts to connect to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::service::types::HostDescriptor;
use crate::settings::ConnectionSettings;

/// Picks the host to connect to out of one discovery round.
///
/// Local-only sessions take the first local host. Otherwise a host whose
/// name contains the remembered host name is preferred; announced names may
/// carry suffixes (machine tags, the local-domain suffix) the stored name
/// lacks, so containment is the match, not equality. Failing that, the
/// first announced host wins.
pub(crate) fn select_host<'a>(
    hosts: &'a [HostDescriptor],
    settings: &ConnectionSettings,
) -> Option<&'a HostDescriptor> {
    if hosts.is_empty() {
        return None;
    }
    if settings.local_only {
        return hosts.first();
    }
    let last = settings.last_connected_host.as_str();
    if !last.is_empty() {
        if let Some(found) = hosts.iter().find(|h| h.name.contains(last)) {
            return Some(found);
        }
    }
    hosts.first()
}

/// Ensures at most one discovery round is in flight.
///
/// Discovery involves a network wait; a slow round must not be stacked on
/// by the next tick. [`DiscoveryGuard::try_begin`] hands out a token that
/// re-arms the guard when dropped.
#[derive(Clone, Debug, Default)]
pub(crate) struct DiscoveryGuard {
    busy: Arc<AtomicBool>,
}

pub(crate) struct DiscoveryToken {
    busy: Arc<AtomicBool>,
}

impl DiscoveryGuard {
    pub(crate) fn try_begin(&self) -> Option<DiscoveryToken> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(DiscoveryToken {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }
}

impl Drop for DiscoveryToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

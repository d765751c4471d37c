use std::net::{IpAddr, SocketAddr};

use ahash::HashMap;

use crate::{timer::TimerHandle, transactions::TransactionId};

/// A permission for one peer IP.
///
/// Installed un-acked when the create permission request goes out, acked
/// by the matching success response.  Only an acked permission authorizes
/// sending, and only an acked permission carries an expiry timer.
pub struct Permission {
    /// the transaction that installed or last refreshed this permission.
    pub transaction_id: TransactionId,
    pub acked: bool,
    /// armed for five minutes on ack, tagged with the sequence the timer
    /// event must match.
    pub timer: Option<(u64, TimerHandle)>,
}

/// Client side state of the relayed allocation.
///
/// At most one allocation exists per session.  The lifetime timer, the
/// lifetime value and the relayed address are all present or all absent.
#[derive(Default)]
pub struct Relay {
    pub relayed: Option<SocketAddr>,
    pub lifetime: Option<u32>,
    pub timer: Option<(u64, TimerHandle)>,
    pub permissions: HashMap<IpAddr, Permission>,
}

impl Relay {
    pub fn is_allocated(&self) -> bool {
        self.relayed.is_some()
    }

    /// whether data may be sent to the peer.
    ///
    /// the port is not part of the match, a permission covers the whole
    /// peer IP.
    pub fn can_send(&self, peer: IpAddr) -> bool {
        self.permissions.get(&peer).map(|it| it.acked).unwrap_or(false)
    }

    /// the allocation succeeded or was refreshed.
    ///
    /// records the relayed address and lifetime and takes ownership of
    /// the freshly armed lifetime timer, replacing (and thereby
    /// cancelling) the previous one.
    pub fn on_allocated(&mut self, relayed: SocketAddr, lifetime: u32, timer: (u64, TimerHandle)) {
        self.relayed = Some(relayed);
        self.lifetime = Some(lifetime);
        self.timer = Some(timer);
    }

    /// install an un-acked permission for a peer.
    ///
    /// a repeated create permission for an already known peer re-tags it
    /// with the new transaction id; the acked flag and any running timer
    /// survive until the response settles things.
    pub fn install_unacked(&mut self, peer: IpAddr, transaction_id: TransactionId) {
        match self.permissions.get_mut(&peer) {
            Some(permission) => permission.transaction_id = transaction_id,
            None => {
                self.permissions.insert(
                    peer,
                    Permission {
                        transaction_id,
                        acked: false,
                        timer: None,
                    },
                );
            }
        }
    }

    /// the peers whose permission was installed by the given transaction.
    pub fn installed_by(&self, transaction_id: &TransactionId) -> Vec<IpAddr> {
        self.permissions
            .iter()
            .filter(|(_, p)| &p.transaction_id == transaction_id)
            .map(|(peer, _)| *peer)
            .collect()
    }

    /// a permission timer fired.
    ///
    /// removes the permission silently, unless the fire is stale because
    /// the permission has been re-acked since the timer was armed.
    pub fn expire_permission(&mut self, peer: IpAddr, seq: u64) {
        if let Some(permission) = self.permissions.get(&peer)
            && permission.timer.as_ref().map(|(s, _)| *s) == Some(seq)
        {
            self.permissions.remove(&peer);
        }
    }

    /// the allocation is gone, by expiry or by a zero lifetime refresh.
    ///
    /// dropping the permission map cancels every permission timer along
    /// with the allocation timer; no network message is sent.
    pub fn clear(&mut self) {
        self.relayed = None;
        self.lifetime = None;
        self.timer = None;
        self.permissions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_match_by_ip_only_when_acked() {
        let mut relay = Relay::default();
        let id = [1u8; 12];

        relay.install_unacked("203.0.113.4".parse().unwrap(), id);
        relay.install_unacked("203.0.113.5".parse().unwrap(), id);

        // un-acked permissions grant nothing.
        assert!(!relay.can_send("203.0.113.4".parse().unwrap()));

        for peer in relay.installed_by(&id) {
            relay.permissions.get_mut(&peer).unwrap().acked = true;
        }

        assert!(relay.can_send("203.0.113.4".parse().unwrap()));
        assert!(relay.can_send("203.0.113.5".parse().unwrap()));
        assert!(!relay.can_send("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn only_matching_transactions_ack() {
        let mut relay = Relay::default();

        relay.install_unacked("203.0.113.4".parse().unwrap(), [1u8; 12]);
        relay.install_unacked("203.0.113.5".parse().unwrap(), [2u8; 12]);

        assert_eq!(
            relay.installed_by(&[1u8; 12]),
            vec!["203.0.113.4".parse::<IpAddr>().unwrap()]
        );
    }

    #[test]
    fn stale_expiry_leaves_the_permission_alone() {
        let mut relay = Relay::default();
        let peer: IpAddr = "203.0.113.4".parse().unwrap();

        relay.install_unacked(peer, [1u8; 12]);
        relay.expire_permission(peer, 7);

        assert!(relay.permissions.contains_key(&peer));
    }

    #[test]
    fn clear_resets_everything() {
        let mut relay = Relay::default();
        relay.relayed = Some("198.51.100.7:49160".parse().unwrap());
        relay.lifetime = Some(600);
        relay.install_unacked("203.0.113.4".parse().unwrap(), [1u8; 12]);

        relay.clear();

        assert!(!relay.is_allocated());
        assert!(relay.lifetime.is_none());
        assert!(relay.timer.is_none());
        assert!(relay.permissions.is_empty());
    }
}

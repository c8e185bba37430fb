/// `PUID`/`PGID` as read from the environment. The daemon only observes and logs these at
/// startup — the actual privilege drop is performed by the container entrypoint script before
/// the daemon process starts, out of scope here (spec §6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectiveIds {
    pub puid: Option<u32>,
    pub pgid: Option<u32>,
}

pub fn read_effective_ids() -> EffectiveIds {
    EffectiveIds {
        puid: std::env::var("PUID").ok().and_then(|v| v.parse().ok()),
        pgid: std::env::var("PGID").ok().and_then(|v| v.parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_vars_yield_none() {
        std::env::remove_var("PUID");
        std::env::remove_var("PGID");
        assert_eq!(read_effective_ids(), EffectiveIds { puid: None, pgid: None });
    }
}

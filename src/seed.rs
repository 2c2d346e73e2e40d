//! Default accounts and candidates installed at ignition.

use log::{debug, info};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::model::{
    admin::{default_admins, Admin},
    candidate::default_roster,
};

/// Ensure the default admins and the default roster exist in the registry
/// and on the ledger. Anything already present is left untouched.
pub async fn seed_defaults(backend: &Backend) -> Result<()> {
    let mut admins = 0;
    for new in default_admins() {
        if backend.registry.find_admin(&new.admin_id).await?.is_some() {
            continue;
        }
        let admin_id = new.admin_id.clone();
        match backend.registry.insert_admin(Admin::try_from(new)?).await {
            Ok(()) => admins += 1,
            Err(Error::AlreadyExists(_)) => debug!("Admin {admin_id} already exists"),
            Err(e) => return Err(e),
        }
    }

    let roster = default_roster();
    let on_ledger = backend.contract.init_ledger(&roster).await?;
    let mut on_roster = 0;
    for candidate in roster {
        let candidate_id = candidate.candidate_id.clone();
        match backend.registry.insert_candidate(candidate).await {
            Ok(()) => on_roster += 1,
            Err(Error::AlreadyExists(_)) => debug!("Candidate {candidate_id} already on roster"),
            Err(e) => return Err(e),
        }
    }

    info!("Seeded {admins} admin(s), {on_roster} roster and {on_ledger} ledger candidate(s)");
    Ok(())
}

use tokio::sync::watch;

use crate::models::ClinicId;

/// Supplies the signed-in clinic. `None` means nobody is signed in yet.
pub trait IdentityProvider: Send + Sync {
    fn current_clinic_id(&self) -> Option<ClinicId>;

    /// Notified whenever the signed-in clinic changes.
    fn watch(&self) -> watch::Receiver<Option<ClinicId>>;
}

pub struct SessionIdentity {
    clinic: watch::Sender<Option<ClinicId>>,
}

impl SessionIdentity {
    pub fn signed_out() -> Self {
        let (clinic, _) = watch::channel(None);
        Self { clinic }
    }

    #[cfg(test)]
    pub fn signed_in(clinic_id: ClinicId) -> Self {
        let (clinic, _) = watch::channel(Some(clinic_id));
        Self { clinic }
    }

    pub fn sign_in(&self, clinic_id: ClinicId) {
        self.replace(Some(clinic_id));
    }

    pub fn sign_out(&self) {
        self.replace(None);
    }

    fn replace(&self, next: Option<ClinicId>) {
        let changed = self.clinic.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            match next {
                Some(clinic_id) => tracing::info!(clinic_id = %clinic_id, "Clinic signed in"),
                None => tracing::info!("Clinic signed out"),
            }
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_clinic_id(&self) -> Option<ClinicId> {
        *self.clinic.borrow()
    }

    fn watch(&self) -> watch::Receiver<Option<ClinicId>> {
        self.clinic.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn starts_signed_out() {
        let identity = SessionIdentity::signed_out();
        assert_eq!(identity.current_clinic_id(), None);
    }

    #[test]
    fn re_signing_into_same_clinic_is_not_a_change() {
        let clinic_id = ClinicId(Uuid::new_v4());
        let identity = SessionIdentity::signed_in(clinic_id);
        let mut changes = identity.watch();
        changes.borrow_and_update();

        identity.sign_in(clinic_id);
        assert!(!changes.has_changed().unwrap());

        identity.sign_out();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), None);
    }
}

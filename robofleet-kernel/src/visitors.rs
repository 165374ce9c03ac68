use crate::alerts::AlertLedger;
use crate::dispatcher::{Dispatcher, Topic};
use crate::error::{KernelError, KernelResult};
use crate::models::{parse_timestamp, AccessDecision, Floor, Severity, VisitorAuthorization};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Payload entrant du système de vérification (visitor_id texte ou entier)
#[derive(Debug, Deserialize)]
pub struct VisitorAuthorizationIn {
    #[serde(deserialize_with = "visitor_id_from_any")]
    pub visitor_id: String,
    pub name: String,
    pub destination_floor: Floor,
    pub entry_time: String,
    pub valid_until: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

pub(crate) fn visitor_id_from_any<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }
    Ok(match RawId::deserialize(d)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

impl VisitorAuthorizationIn {
    pub fn into_authorization(self) -> KernelResult<VisitorAuthorization> {
        if self.visitor_id.trim().is_empty() {
            return Err(KernelError::Validation("visitor_id is empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(KernelError::Validation("name is empty".into()));
        }
        let entry_time = parse_timestamp(&self.entry_time)
            .ok_or_else(|| KernelError::Validation(format!("bad entry_time: {}", self.entry_time)))?;
        let valid_until = parse_timestamp(&self.valid_until)
            .ok_or_else(|| KernelError::Validation(format!("bad valid_until: {}", self.valid_until)))?;
        if valid_until < entry_time {
            return Err(KernelError::Validation("valid_until precedes entry_time".into()));
        }

        Ok(VisitorAuthorization {
            visitor_id: self.visitor_id,
            name: self.name,
            destination_floor: self.destination_floor,
            purpose: self.purpose,
            entry_time,
            valid_until,
        })
    }
}

pub struct VisitorTable {
    bindings: Mutex<HashMap<String, VisitorAuthorization>>,
    ledger: Arc<AlertLedger>,
    dispatcher: Arc<Dispatcher>,
}

impl VisitorTable {
    pub fn new(ledger: Arc<AlertLedger>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            ledger,
            dispatcher,
        }
    }

    /// Insère ou remplace (last-writer-wins) le binding du visiteur.
    /// Retourne le binding remplacé s'il existait.
    pub fn authorize(&self, auth: VisitorAuthorization) -> Option<VisitorAuthorization> {
        let previous = self
            .bindings
            .lock()
            .insert(auth.visitor_id.clone(), auth.clone());

        tracing::info!(
            visitor_id = %auth.visitor_id,
            floor = auth.destination_floor,
            replaced = previous.is_some(),
            "visitor authorized"
        );
        self.ledger.append(
            format!("New authorized visitor: {} - Floor {}", auth.name, auth.destination_floor),
            Severity::Info,
        );
        self.dispatcher.publish(Topic::NewVisitor, &auth);
        previous
    }

    /// Vérifie la présence d'un visiteur à un étage.
    // TODO: compare against valid_until once expiry enforcement is approved
    pub fn check_access(&self, visitor_id: &str, observed_floor: Floor) -> KernelResult<AccessDecision> {
        let binding = self
            .bindings
            .lock()
            .get(visitor_id)
            .cloned()
            .ok_or_else(|| KernelError::Unauthorized(visitor_id.to_string()))?;

        if binding.destination_floor == observed_floor {
            return Ok(AccessDecision::Authorized);
        }

        let reason = format!(
            "SECURITY ALERT: {} detected on floor {} (authorized: {})",
            binding.name, observed_floor, binding.destination_floor
        );
        tracing::warn!(visitor_id, observed_floor, authorized_floor = binding.destination_floor, "visitor floor mismatch");
        self.ledger.append(reason.clone(), Severity::Security);
        Ok(AccessDecision::Denied { reason })
    }

    pub fn get(&self, visitor_id: &str) -> Option<VisitorAuthorization> {
        self.bindings.lock().get(visitor_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.bindings.lock().len()
    }
}

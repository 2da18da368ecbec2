//! Role-based access policy
//!
//! Admins see and change everything. Technicians see the work assigned to
//! them and the clients/equipment behind that work. Clients see only their
//! own records. The backend turns a [`Scope`] into SQL filters and asks the
//! helpers below before any write.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{QuoteStatus, ServiceStatus, UserRole};

/// Reasons an actor is turned away
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("{0}")]
    Forbidden(String),

    #[error("account is not linked to a {0} profile")]
    MissingProfile(UserRole),
}

/// The authenticated caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
    /// Client id for clients, technician id for technicians
    pub profile_id: Option<Uuid>,
}

/// Which rows the actor may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Technician(Uuid),
    Client(Uuid),
}

impl Scope {
    pub fn client_filter(&self) -> Option<Uuid> {
        match self {
            Scope::Client(id) => Some(*id),
            _ => None,
        }
    }

    pub fn technician_filter(&self) -> Option<Uuid> {
        match self {
            Scope::Technician(id) => Some(*id),
            _ => None,
        }
    }
}

/// What part of a service job an actor may edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEdit {
    /// Every field
    Full,
    /// Diagnosis, resolution, hours and cost
    Work,
    /// Title and description of a pending request
    Request,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn scope(&self) -> Result<Scope, AccessError> {
        match self.role {
            UserRole::Admin => Ok(Scope::All),
            UserRole::Technician => self
                .profile_id
                .map(Scope::Technician)
                .ok_or(AccessError::MissingProfile(UserRole::Technician)),
            UserRole::Client => self
                .profile_id
                .map(Scope::Client)
                .ok_or(AccessError::MissingProfile(UserRole::Client)),
        }
    }

    pub fn require_admin(&self) -> Result<(), AccessError> {
        self.require_any(&[UserRole::Admin])
    }

    pub fn require_any(&self, roles: &[UserRole]) -> Result<(), AccessError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AccessError::Forbidden(format!(
                "role '{}' is not allowed to perform this action",
                self.role
            )))
        }
    }

    /// Own client id, if the actor is a client
    pub fn client_id(&self) -> Option<Uuid> {
        match self.role {
            UserRole::Client => self.profile_id,
            _ => None,
        }
    }

    /// Own technician id, if the actor is a technician
    pub fn technician_id(&self) -> Option<Uuid> {
        match self.role {
            UserRole::Technician => self.profile_id,
            _ => None,
        }
    }

    /// Admins may edit any client, clients only themselves
    pub fn can_edit_client(&self, client_id: Uuid) -> bool {
        self.is_admin() || self.client_id() == Some(client_id)
    }

    /// Admins may edit any technician; a technician may edit their own
    /// profile but not the fields reserved for admins
    pub fn check_technician_edit(
        &self,
        technician_id: Uuid,
        touches_admin_fields: bool,
    ) -> Result<(), AccessError> {
        if self.is_admin() {
            return Ok(());
        }
        if self.technician_id() != Some(technician_id) {
            return Err(AccessError::Forbidden(
                "technicians can only edit their own profile".to_string(),
            ));
        }
        if touches_admin_fields {
            return Err(AccessError::Forbidden(
                "status and hourly rate can only be changed by an admin".to_string(),
            ));
        }
        Ok(())
    }

    /// Admins may manage any equipment, clients only their own
    pub fn can_manage_equipment(&self, owner_client_id: Uuid) -> bool {
        self.is_admin() || self.client_id() == Some(owner_client_id)
    }

    /// Decide how much of a service job this actor may edit
    pub fn service_edit(
        &self,
        job_client_id: Uuid,
        job_technician_id: Option<Uuid>,
        status: ServiceStatus,
    ) -> Result<ServiceEdit, AccessError> {
        match self.role {
            UserRole::Admin => Ok(ServiceEdit::Full),
            UserRole::Technician if self.is_assigned(job_technician_id) => Ok(ServiceEdit::Work),
            UserRole::Client
                if self.client_id() == Some(job_client_id)
                    && status == ServiceStatus::Pending =>
            {
                Ok(ServiceEdit::Request)
            }
            UserRole::Client if self.client_id() == Some(job_client_id) => Err(
                AccessError::Forbidden("only pending requests can be edited".to_string()),
            ),
            _ => Err(AccessError::Forbidden(
                "not allowed to edit this service".to_string(),
            )),
        }
    }

    /// Check a status change on a job.
    ///
    /// Clients may only cancel their own job, and only before work starts.
    pub fn check_service_status_change(
        &self,
        job_client_id: Uuid,
        job_technician_id: Option<Uuid>,
        current: ServiceStatus,
        next: ServiceStatus,
    ) -> Result<(), AccessError> {
        match self.role {
            UserRole::Admin => Ok(()),
            UserRole::Technician if self.is_assigned(job_technician_id) => Ok(()),
            UserRole::Client if self.client_id() == Some(job_client_id) => {
                if next != ServiceStatus::Cancelled {
                    return Err(AccessError::Forbidden(
                        "clients can only cancel their requests".to_string(),
                    ));
                }
                if !matches!(current, ServiceStatus::Pending | ServiceStatus::Scheduled) {
                    return Err(AccessError::Forbidden(
                        "clients can only cancel pending or scheduled services".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Err(AccessError::Forbidden(
                "not allowed to change the status of this service".to_string(),
            )),
        }
    }

    fn is_assigned(&self, job_technician_id: Option<Uuid>) -> bool {
        job_technician_id.is_some() && self.technician_id() == job_technician_id
    }

    /// Clients accept or reject their own quotes; admins may record the answer
    pub fn can_answer_quote(&self, quote_client_id: Uuid) -> bool {
        self.is_admin() || self.client_id() == Some(quote_client_id)
    }

    /// Admins and the author may change a quote
    pub fn can_edit_quote(&self, created_by: Uuid) -> bool {
        self.is_admin() || (self.role == UserRole::Technician && self.user_id == created_by)
    }
}

/// Clients never see quotes that are still being drafted
pub fn client_can_see_quote(status: QuoteStatus) -> bool {
    status != QuoteStatus::Draft
}

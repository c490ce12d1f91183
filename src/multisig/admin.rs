//! Membership-change protocol
//!
//! Add/remove/replace member and change requirement. These only ever run as
//! the dispatch of a wallet transaction aimed at the wallet itself; the
//! resulting [`MembershipChange`] tells the runtime which registry callbacks
//! and events to issue.

use crate::core::call::AdminAction;
use crate::core::Address;
use crate::multisig::wallet::{validate_requirement, MultiSigWallet, MultisigError, MAX_MEMBERS};

/// Net effect of an applied admin action
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipChange {
    pub added: Vec<Address>,
    pub removed: Vec<Address>,
    /// New threshold, when it changed (explicitly or by clamping)
    pub required: Option<usize>,
}

impl MultiSigWallet {
    /// Apply an admin action to the member set and threshold
    ///
    /// Leaves the wallet untouched on error.
    pub fn apply_admin(&mut self, action: &AdminAction) -> Result<MembershipChange, MultisigError> {
        match action {
            AdminAction::AddMember { member } => self.add_member(member),
            AdminAction::RemoveMember { member } => self.remove_member(member),
            AdminAction::ReplaceMember { member, new_member } => {
                self.replace_member(member, new_member)
            }
            AdminAction::ChangeRequirement { required } => self.change_requirement(*required),
        }
    }

    fn add_member(&mut self, member: &Address) -> Result<MembershipChange, MultisigError> {
        self.check_new_member(member)?;
        if self.members().len() >= MAX_MEMBERS {
            return Err(MultisigError::InvalidParameter(format!(
                "wallet already has the maximum of {} members",
                MAX_MEMBERS
            )));
        }

        self.members_mut().push(member.clone());
        Ok(MembershipChange {
            added: vec![member.clone()],
            ..Default::default()
        })
    }

    fn remove_member(&mut self, member: &Address) -> Result<MembershipChange, MultisigError> {
        self.check_existing_member(member)?;
        if self.members().len() == 1 {
            return Err(MultisigError::InvalidParameter(
                "cannot remove the last member".to_string(),
            ));
        }

        self.members_mut().retain(|m| m != member);

        // Threshold repair
        let remaining = self.members().len();
        let required = if self.required() > remaining {
            self.set_required(remaining);
            Some(remaining)
        } else {
            None
        };

        Ok(MembershipChange {
            removed: vec![member.clone()],
            required,
            ..Default::default()
        })
    }

    fn replace_member(
        &mut self,
        member: &Address,
        new_member: &Address,
    ) -> Result<MembershipChange, MultisigError> {
        self.check_existing_member(member)?;
        self.check_new_member(new_member)?;

        // Keeps the replaced member's position
        if let Some(index) = self.members().iter().position(|m| m == member) {
            self.members_mut()[index] = new_member.clone();
        }

        Ok(MembershipChange {
            added: vec![new_member.clone()],
            removed: vec![member.clone()],
            required: None,
        })
    }

    fn change_requirement(&mut self, required: usize) -> Result<MembershipChange, MultisigError> {
        validate_requirement(self.members().len(), required)?;
        self.set_required(required);
        Ok(MembershipChange {
            required: Some(required),
            ..Default::default()
        })
    }

    fn check_new_member(&self, member: &Address) -> Result<(), MultisigError> {
        if member.is_zero() {
            return Err(MultisigError::InvalidParameter(
                "member must not be the zero address".to_string(),
            ));
        }
        if self.is_member(member) {
            return Err(MultisigError::InvalidParameter(format!(
                "{} is already a member",
                member
            )));
        }
        Ok(())
    }

    fn check_existing_member(&self, member: &Address) -> Result<(), MultisigError> {
        if !self.is_member(member) {
            return Err(MultisigError::InvalidParameter(format!(
                "{} is not a member",
                member
            )));
        }
        Ok(())
    }
}

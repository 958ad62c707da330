// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::{
    modules::{
        campaign::entity::CampaignEntity,
        error::{code::ErrorCode, MailcastResult},
        queue::RecipientRole,
    },
    raise_error, validate_email,
};

/// Envelope of one outbound message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Destination {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl Destination {
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

pub struct RecipientResolver;

impl RecipientResolver {
    /// Builds the envelope for one queue entry. Only `primary` carries the
    /// campaign's cc/bcc lists; `cc` and `bcc` copies are addressed to the
    /// sender so the contact never lands in `to`.
    pub fn resolve(
        role: RecipientRole,
        contact_address: &str,
        campaign: &CampaignEntity,
    ) -> MailcastResult<Destination> {
        let destination = match role {
            RecipientRole::Primary => Destination {
                to: vec![contact_address.to_string()],
                cc: campaign.cc_list.clone(),
                bcc: campaign.bcc_list.clone(),
            },
            RecipientRole::Cc => Destination {
                to: vec![campaign.sender_address.clone()],
                cc: vec![contact_address.to_string()],
                bcc: Vec::new(),
            },
            RecipientRole::Bcc => Destination {
                to: vec![campaign.sender_address.clone()],
                cc: Vec::new(),
                bcc: vec![contact_address.to_string()],
            },
        };

        for address in &destination.to {
            if address.trim().is_empty() || validate_email!(address).is_err() {
                return Err(raise_error!(
                    format!(
                        "No valid primary recipient for campaign '{}' (role: {}, to: '{}')",
                        campaign.campaign_id, role, address
                    ),
                    ErrorCode::NoPrimaryRecipient
                ));
            }
        }
        Ok(destination)
    }

    /// The role under which `contact_address` is also listed on the campaign,
    /// if any. A primary entry with an overlap means the address receives
    /// two messages.
    pub fn listed_role(contact_address: &str, campaign: &CampaignEntity) -> Option<RecipientRole> {
        let matches = |list: &[String]| {
            list.iter()
                .any(|a| a.trim().eq_ignore_ascii_case(contact_address.trim()))
        };
        if matches(&campaign.cc_list) {
            Some(RecipientRole::Cc)
        } else if matches(&campaign.bcc_list) {
            Some(RecipientRole::Bcc)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(sender: &str) -> CampaignEntity {
        let mut campaign = CampaignEntity::new("c1", "Hi", "Body", sender, 3);
        campaign.cc_list = vec!["boss@example.com".into()];
        campaign.bcc_list = vec!["archive@example.com".into(), "audit@example.com".into()];
        campaign
    }

    #[test]
    fn primary_mirrors_campaign_lists() {
        let campaign = campaign("news@example.com");
        let destination =
            RecipientResolver::resolve(RecipientRole::Primary, "jane@example.com", &campaign)
                .unwrap();
        assert_eq!(destination.to, vec!["jane@example.com".to_string()]);
        assert_eq!(destination.cc, campaign.cc_list);
        assert_eq!(destination.bcc, campaign.bcc_list);
    }

    #[test]
    fn copies_never_put_the_contact_in_to() {
        let campaign = campaign("news@example.com");
        for role in [RecipientRole::Cc, RecipientRole::Bcc] {
            let destination =
                RecipientResolver::resolve(role, "boss@example.com", &campaign).unwrap();
            assert!(!destination.to.contains(&"boss@example.com".to_string()));
            assert_eq!(destination.to, vec!["news@example.com".to_string()]);
            assert_eq!(destination.recipient_count(), 2);
        }
        let cc = RecipientResolver::resolve(RecipientRole::Cc, "boss@example.com", &campaign)
            .unwrap();
        assert_eq!(cc.cc, vec!["boss@example.com".to_string()]);
        assert!(cc.bcc.is_empty());
        let bcc = RecipientResolver::resolve(RecipientRole::Bcc, "audit@example.com", &campaign)
            .unwrap();
        assert_eq!(bcc.bcc, vec!["audit@example.com".to_string()]);
        assert!(bcc.cc.is_empty());
    }

    #[test]
    fn cc_without_sender_has_no_primary_recipient() {
        let campaign = campaign("");
        let err = RecipientResolver::resolve(RecipientRole::Cc, "boss@example.com", &campaign)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoPrimaryRecipient);
    }

    #[test]
    fn malformed_primary_address_has_no_primary_recipient() {
        let campaign = campaign("news@example.com");
        for address in ["", "   ", "not-an-address", "Jane <jane@example.com>"] {
            let err = RecipientResolver::resolve(RecipientRole::Primary, address, &campaign)
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::NoPrimaryRecipient);
        }
    }

    #[test]
    fn detects_addresses_listed_on_the_campaign() {
        let campaign = campaign("news@example.com");
        assert_eq!(
            RecipientResolver::listed_role("BOSS@example.com", &campaign),
            Some(RecipientRole::Cc)
        );
        assert_eq!(
            RecipientResolver::listed_role("audit@example.com", &campaign),
            Some(RecipientRole::Bcc)
        );
        assert_eq!(RecipientResolver::listed_role("jane@example.com", &campaign), None);
    }
}

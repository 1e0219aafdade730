// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Subject identity of the code signing certificate. */

use crate::error::{EfiSignError, Result};

/// Distinguished name fields of the self-signed certificate's subject.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdentityFields {
    /// Two letter country code (`C`).
    pub country: String,
    /// State or province (`ST`).
    pub state: String,
    /// Locality or city (`L`).
    pub locality: String,
    /// Organization (`O`).
    pub organization: String,
    /// Organizational unit (`OU`). Omitted from the subject when unset.
    pub organizational_unit: Option<String>,
    /// Common name (`CN`).
    pub common_name: String,
}

impl IdentityFields {
    pub fn new(
        country: impl ToString,
        state: impl ToString,
        locality: impl ToString,
        organization: impl ToString,
        common_name: impl ToString,
    ) -> Self {
        Self {
            country: country.to_string(),
            state: state.to_string(),
            locality: locality.to_string(),
            organization: organization.to_string(),
            organizational_unit: None,
            common_name: common_name.to_string(),
        }
    }

    pub fn set_organizational_unit(&mut self, value: impl ToString) {
        self.organizational_unit = Some(value.to_string());
    }

    /// Ensure every field can be rendered into a request config.
    ///
    /// Values are substituted verbatim, so a line break would inject
    /// arbitrary config directives.
    pub fn validate(&self) -> Result<()> {
        validate_field("country", &self.country)?;
        validate_field("state", &self.state)?;
        validate_field("locality", &self.locality)?;
        validate_field("organization", &self.organization)?;
        if let Some(unit) = &self.organizational_unit {
            validate_field("organizational unit", unit)?;
        }
        validate_field("common name", &self.common_name)?;

        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EfiSignError::InvalidIdentity {
                field: "country",
                reason: format!("{:?} is not a two letter country code", self.country),
            });
        }

        Ok(())
    }
}

fn validate_field(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(EfiSignError::InvalidIdentity {
            field,
            reason: "value is empty".to_string(),
        })
    } else if value.chars().any(|c| c.is_control()) {
        Err(EfiSignError::InvalidIdentity {
            field,
            reason: "value contains control characters".to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linus() -> IdentityFields {
        IdentityFields::new("UK", "London", "London", "Linus Media Group", "Linus")
    }

    #[test]
    fn valid_identity() -> Result<()> {
        linus().validate()?;

        let mut identity = linus();
        identity.set_organizational_unit("Firmware");
        identity.validate()?;

        Ok(())
    }

    #[test]
    fn empty_field_rejected() {
        let mut identity = linus();
        identity.common_name = "  ".to_string();

        assert!(matches!(
            identity.validate(),
            Err(EfiSignError::InvalidIdentity {
                field: "common name",
                ..
            })
        ));
    }

    #[test]
    fn newline_rejected() {
        let mut identity = linus();
        identity.organization = "Linus\nCN = Evil".to_string();

        assert!(matches!(
            identity.validate(),
            Err(EfiSignError::InvalidIdentity {
                field: "organization",
                ..
            })
        ));
    }

    #[test]
    fn country_code_shape() {
        for bad in ["GBR", "U", "1K"] {
            let mut identity = linus();
            identity.country = bad.to_string();
            assert!(identity.validate().is_err(), "{} should be rejected", bad);
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Random identifiers for firmware metadata. */

use uuid::Uuid;

/// Generate a random (version 4) GUID.
pub fn generate_guid() -> Uuid {
    let guid = Uuid::new_v4();
    log::debug!("generated GUID {}", guid);

    guid
}

#[cfg(test)]
mod tests {
    use {super::*, uuid::Variant};

    #[test]
    fn random_guid_format() {
        let guid = generate_guid();

        assert_eq!(guid.get_version_num(), 4);
        assert_eq!(guid.get_variant(), Variant::RFC4122);

        let text = guid.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(Uuid::parse_str(&text).unwrap(), guid);
    }

    #[test]
    fn guids_differ() {
        assert_ne!(generate_guid(), generate_guid());
    }
}

//! Address scheme for the `bev` transaction family.
//!
//! Every address is 70 hex characters:
//!
//! ```text
//! bb3cb0 02 2f448266fef37f1fd1f3dbabf258c81b1bb19850f759818560d19667b51bf0
//! ^^^^^^ ^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
//! ns     |  sha512(identifier)[..62]
//!        type selector
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Transaction family name.
pub const FAMILY_NAME: &str = "bev";

/// Transaction family version.
pub const FAMILY_VERSION: &str = "0.1";

/// `sha512("bev")[..6]`.
pub const NAMESPACE: &str = "bb3cb0";

/// Total address length in hex characters.
pub const ADDRESS_LENGTH: usize = 70;

const NAMESPACE_LENGTH: usize = 6;
const INFIX_LENGTH: usize = 2;
const HASH_LENGTH: usize = ADDRESS_LENGTH - NAMESPACE_LENGTH - INFIX_LENGTH;

/// Which part of the state space an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSpace {
    Election,
    VotingOption,
    PollRegistration,
    Voter,
    Vote,
    /// Foreign namespace or unknown type selector.
    OtherFamily,
}

impl AddressSpace {
    /// Two-character type selector, `None` for [`AddressSpace::OtherFamily`].
    pub fn infix(self) -> Option<&'static str> {
        match self {
            Self::Election => Some("02"),
            Self::VotingOption => Some("03"),
            Self::PollRegistration => Some("04"),
            Self::Voter => Some("05"),
            Self::Vote => Some("06"),
            Self::OtherFamily => None,
        }
    }

    fn from_infix(infix: &str) -> Self {
        match infix {
            "02" => Self::Election,
            "03" => Self::VotingOption,
            "04" => Self::PollRegistration,
            "05" => Self::Voter,
            "06" => Self::Vote,
            _ => Self::OtherFamily,
        }
    }
}

impl std::fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Election => write!(f, "election"),
            Self::VotingOption => write!(f, "voting option"),
            Self::PollRegistration => write!(f, "poll registration"),
            Self::Voter => write!(f, "voter"),
            Self::Vote => write!(f, "vote"),
            Self::OtherFamily => write!(f, "other family"),
        }
    }
}

/// Returns `true` if `address` starts with `namespace`.
pub fn in_namespace(address: &str, namespace: &str) -> bool {
    address.starts_with(namespace)
}

/// Classify an address by the family namespace and its type selector.
pub fn address_type(address: &str) -> AddressSpace {
    if !in_namespace(address, NAMESPACE) {
        return AddressSpace::OtherFamily;
    }
    selector_space(address)
}

/// Classify an address by its type selector alone, whatever its namespace.
pub fn selector_space(address: &str) -> AddressSpace {
    match address.get(NAMESPACE_LENGTH..NAMESPACE_LENGTH + INFIX_LENGTH) {
        Some(infix) => AddressSpace::from_infix(infix),
        None => AddressSpace::OtherFamily,
    }
}

/// Build the address of `identifier` within `space`.
///
/// Returns `None` for [`AddressSpace::OtherFamily`], which has no infix.
pub fn make_address(space: AddressSpace, identifier: &str) -> Option<String> {
    make_address_in(NAMESPACE, space, identifier)
}

/// Like [`make_address`], under another namespace prefix.
pub fn make_address_in(namespace: &str, space: AddressSpace, identifier: &str) -> Option<String> {
    let infix = space.infix()?;
    let digest = hex::encode(Sha512::digest(identifier.as_bytes()));
    Some(format!("{namespace}{infix}{}", &digest[..HASH_LENGTH]))
}

pub fn election_address(election_id: &str) -> String {
    address_for(AddressSpace::Election, election_id)
}

pub fn voting_option_address(voting_option_id: &str) -> String {
    address_for(AddressSpace::VotingOption, voting_option_id)
}

pub fn poll_registration_address(voter_id: &str) -> String {
    address_for(AddressSpace::PollRegistration, voter_id)
}

pub fn voter_address(public_key: &str) -> String {
    address_for(AddressSpace::Voter, public_key)
}

pub fn vote_address(vote_id: &str) -> String {
    address_for(AddressSpace::Vote, vote_id)
}

fn address_for(space: AddressSpace, identifier: &str) -> String {
    make_address(space, identifier).unwrap_or_default()
}

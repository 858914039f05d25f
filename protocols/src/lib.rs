//! Wire codecs for everything the harvester sends or receives.
//!
//! * [`radiotap`]: the capture/injection header in front of every monitor-mode frame.
//! * [`ieee80211`]: management and data frames, information elements.
//! * [`eapol`]: EAPOL, EAP and the EAP-WSC expanded method.
//! * [`wps`]: WPS attributes, registration messages and key derivation.
//! * [`iw`]: the text output of `iw dev <if> scan`.

pub mod eapol;
pub mod ieee80211;
pub mod iw;
pub mod radiotap;
pub mod wps;

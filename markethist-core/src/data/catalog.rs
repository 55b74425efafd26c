//! Item catalog: market hash names grouped by game.
//!
//! Each game carries its application id and an optional prefix for the
//! output file names, so items from different games never collide on disk.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const APP_CS2: u32 = 730;
pub const APP_DOTA2: u32 = 570;
pub const APP_TF2: u32 = 440;

/// Market hash names fetched by default, written without a file prefix.
pub const CS2_WATCH_LIST: &[&str] = &[
    "AK-47 | Aquamarine Revenge (Field-Tested)",
    "AK-47 | Asiimov (Field-Tested)",
    "AK-47 | Bloodsport (Field-Tested)",
    "AK-47 | Fire Serpent (Field-Tested)",
    "AK-47 | Fuel Injector (Field-Tested)",
    "AK-47 | Gold Arabesque (Field-Tested)",
    "AK-47 | Jaguar (Field-Tested)",
    "AK-47 | Leet Museo (Field-Tested)",
    "AK-47 | Legion of Anubis (Field-Tested)",
    "AK-47 | Neon Revolution (Field-Tested)",
    "AK-47 | Neon Rider (Field-Tested)",
    "AK-47 | Nightwish (Field-Tested)",
    "AK-47 | Redline (Field-Tested)",
    "AK-47 | The Empress (Field-Tested)",
    "AK-47 | Vulcan (Field-Tested)",
    "AK-47 | Wasteland Rebel (Field-Tested)",
    "AK-47 | Wild Lotus (Field-Tested)",
    "AK-47 | X-Ray (Field-Tested)",
    "AUG | Akihabara Accept (Field-Tested)",
    "AUG | Chameleon (Field-Tested)",
    "AUG | Stymphalian (Field-Tested)",
    "AWP | Asiimov (Field-Tested)",
    "AWP | Atheris (Field-Tested)",
    "AWP | Chromatic Aberration (Field-Tested)",
    "AWP | Containment Breach (Field-Tested)",
    "AWP | Desert Hydra (Field-Tested)",
    "AWP | Dragon Lore (Field-Tested)",
    "AWP | Gungnir (Field-Tested)",
    "AWP | Hyper Beast (Field-Tested)",
    "AWP | Man-o'-war (Field-Tested)",
    "AWP | Medusa (Field-Tested)",
    "AWP | Neo-Noir (Field-Tested)",
    "AWP | Oni Taiji (Field-Tested)",
    "AWP | The Prince (Field-Tested)",
    "AWP | Wildfire (Field-Tested)",
    "CZ75-Auto | Crimson Web (Field-Tested)",
    "CZ75-Auto | Tigris (Field-Tested)",
    "CZ75-Auto | Victoria (Factory New)",
    "CZ75-Auto | Victoria (Field-Tested)",
    "Desert Eagle | Blaze (Factory New)",
    "Desert Eagle | Code Red (Field-Tested)",
    "Desert Eagle | Kumicho Dragon (Field-Tested)",
    "Desert Eagle | Midnight Storm (Field-Tested)",
    "Desert Eagle | Ocean Drive (Field-Tested)",
    "Desert Eagle | Printstream (Field-Tested)",
    "FAMAS | Afterimage (Field-Tested)",
    "FAMAS | Commemoration (Field-Tested)",
    "FAMAS | Mecha Industries (Field-Tested)",
    "FAMAS | Roll Cage (Field-Tested)",
    "Five-SeveN | Angry Mob (Field-Tested)",
    "Five-SeveN | Hyper Beast (Field-Tested)",
    "Galil AR | Chatterbox (Field-Tested)",
    "Glock-18 | Bullet Queen (Field-Tested)",
    "Glock-18 | Gamma Doppler (Field-Tested)",
    "Glock-18 | Neo-Noir (Field-Tested)",
    "Glock-18 | Wasteland Rebel (Field-Tested)",
    "Glock-18 | Water Elemental (Field-Tested)",
    "M4A1-S | Chantico's Fire (Field-Tested)",
    "M4A1-S | Cyrex (Field-Tested)",
    "M4A1-S | Golden Coil (Field-Tested)",
    "M4A1-S | Guardian (Field-Tested)",
    "M4A1-S | Hyper Beast (Field-Tested)",
    "M4A1-S | Imminent Danger (Field-Tested)",
    "M4A1-S | Mecha Industries (Field-Tested)",
    "M4A1-S | Player Two (Field-Tested)",
    "M4A1-S | Printstream (Field-Tested)",
    "M4A1-S | Welcome to the Jungle (Field-Tested)",
    "M4A4 | Asiimov (Field-Tested)",
    "M4A4 | Bullet Rain (Field-Tested)",
    "M4A4 | Buzz Kill (Field-Tested)",
    "M4A4 | Howl (Factory New)",
    "M4A4 | In Living Color (Field-Tested)",
    "M4A4 | Neo-Noir (Field-Tested)",
    "M4A4 | Royal Paladin (Field-Tested)",
    "M4A4 | The Battlestar (Field-Tested)",
    "M4A4 | The Coalition (Field-Tested)",
    "M4A4 | The Emperor (Field-Tested)",
    "M4A4 | X-Ray (Field-Tested)",
    "MAC-10 | Neon Rider (Field-Tested)",
    "MAC-10 | Stalker (Field-Tested)",
    "MP5-SD | Gauss (Field-Tested)",
    "MP5-SD | Kitbash (Field-Tested)",
    "MP5-SD | Phosphor (Field-Tested)",
    "MP7 | Bloodsport (Field-Tested)",
    "MP7 | Cirrus (Field-Tested)",
    "MP7 | Nemesis (Field-Tested)",
    "MP9 | Food Chain (Field-Tested)",
    "MP9 | Ruby Poison Dart (Field-Tested)",
    "MP9 | Stained Glass (Field-Tested)",
    "MP9 | Starlight Protector (Field-Tested)",
    "P2000 | Fire Elemental (Field-Tested)",
    "P250 | Sand Dune (Field-Tested)",
    "P250 | See Ya Later (Field-Tested)",
    "P90 | Asiimov (Field-Tested)",
    "P90 | Death by Kitty (Field-Tested)",
    "PP-Bizon | Fuel Rod (Field-Tested)",
    "PP-Bizon | Judgement of Anubis (Field-Tested)",
    "PP-Bizon | Osiris (Field-Tested)",
    "R8 Revolver | Bone Mask (Field-Tested)",
    "R8 Revolver | Fade (Field-Tested)",
    "R8 Revolver | Reboot (Field-Tested)",
    "Sawed-Off | The Kraken (Field-Tested)",
    "SG 553 | Colony IV (Field-Tested)",
    "SG 553 | Integrale (Field-Tested)",
    "SG 553 | Tiger Moth (Field-Tested)",
    "SSG 08 | Blood in the Water (Field-Tested)",
    "SSG 08 | Dragonfire (Field-Tested)",
    "Tec-9 | Avalanche (Field-Tested)",
    "Tec-9 | Fuel Injector (Field-Tested)",
    "Tec-9 | Nuclear Threat (Field-Tested)",
    "USP-S | Kill Confirmed (Field-Tested)",
    "USP-S | Neo-Noir (Field-Tested)",
    "USP-S | Printstream (Field-Tested)",
    "Kilowatt Case",
    "Revolution Case",
    "USP-S | The Traitor (Field-Tested)",
];

/// One tradable item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemIdentity {
    pub app_id: u32,
    pub name: String,
    pub file_prefix: String,
}

impl ItemIdentity {
    pub fn new(app_id: u32, name: impl Into<String>, file_prefix: impl Into<String>) -> Self {
        Self {
            app_id,
            name: name.into(),
            file_prefix: file_prefix.into(),
        }
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [app {}]", self.name, self.app_id)
    }
}

/// Items for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCatalog {
    pub app_id: u32,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// The complete set of items fetched in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub games: Vec<GameCatalog>,
}

impl Catalog {
    /// Flatten into identities, in configuration order.
    pub fn identities(&self) -> Vec<ItemIdentity> {
        self.games
            .iter()
            .flat_map(|game| {
                game.items
                    .iter()
                    .map(move |name| ItemIdentity::new(game.app_id, name.clone(), game.prefix.clone()))
            })
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.games.iter().map(|g| g.items.len()).sum()
    }

    /// Default CS2 watch list (no prefix) plus empty per-game lists.
    pub fn default_catalog() -> Self {
        Self {
            games: vec![
                GameCatalog {
                    app_id: APP_CS2,
                    prefix: String::new(),
                    items: CS2_WATCH_LIST.iter().map(|s| s.to_string()).collect(),
                },
                GameCatalog {
                    app_id: APP_CS2,
                    prefix: "CS_".into(),
                    items: Vec::new(),
                },
                GameCatalog {
                    app_id: APP_DOTA2,
                    prefix: "Dota_".into(),
                    items: Vec::new(),
                },
                GameCatalog {
                    app_id: APP_TF2,
                    prefix: "TF2_".into(),
                    items: Vec::new(),
                },
            ],
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::writer::file_stem;
    use std::collections::HashSet;

    #[test]
    fn identities_keep_game_and_prefix() {
        let catalog: Catalog = toml::from_str(
            r#"
            [[games]]
            app_id = 730
            items = ["Kilowatt Case"]

            [[games]]
            app_id = 570
            prefix = "Dota_"
            items = ["Dragonclaw Hook", "Golden Baby Roshan"]
            "#,
        )
        .unwrap();

        let ids = catalog.identities();
        assert_eq!(ids.len(), 3);
        assert_eq!(catalog.item_count(), 3);
        assert_eq!(ids[0], ItemIdentity::new(730, "Kilowatt Case", ""));
        assert_eq!(ids[2], ItemIdentity::new(570, "Golden Baby Roshan", "Dota_"));
    }

    #[test]
    fn default_catalog_is_cs2() {
        let catalog = Catalog::default();
        assert_eq!(catalog.item_count(), 116);
        assert_eq!(catalog.games.len(), 4);
        assert!(catalog.identities().iter().all(|id| id.app_id == APP_CS2));
        assert!(catalog.identities().iter().all(|id| id.file_prefix.is_empty()));

        let ids = catalog.identities();
        assert_eq!(ids[0].name, "AK-47 | Aquamarine Revenge (Field-Tested)");
        assert_eq!(ids[115].name, "USP-S | The Traitor (Field-Tested)");
    }

    #[test]
    fn default_catalog_files_are_distinct() {
        let ids = Catalog::default().identities();
        let stems: HashSet<String> = ids.iter().map(file_stem).collect();
        assert_eq!(stems.len(), ids.len());
    }

    #[test]
    fn display_names_item_and_game() {
        let id = ItemIdentity::new(440, "Mann Co. Supply Crate Key", "TF2_");
        assert_eq!(id.to_string(), "Mann Co. Supply Crate Key [app 440]");
    }
}

//! Static registry of known parks.
//!
//! The catalog decides which park ids are valid and supplies the headline
//! attractions used when a snapshot has to be synthesised.

use serde::{Deserialize, Serialize};

/// A park the service knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkDefinition {
  pub id:                   String,
  pub name:                 String,
  pub resort:               String,
  /// Alternative names used when matching upstream park listings.
  #[serde(default)]
  pub aliases:              Vec<String>,
  pub headline_attractions: Vec<String>,
}

/// Summary row for park listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkListing {
  pub id:     String,
  pub name:   String,
  pub resort: String,
}

#[derive(Debug, Clone)]
pub struct ParkCatalog {
  parks: Vec<ParkDefinition>,
}

impl ParkCatalog {
  pub fn new(parks: Vec<ParkDefinition>) -> Self { Self { parks } }

  pub fn get(&self, park_id: &str) -> Option<&ParkDefinition> {
    self.parks.iter().find(|p| p.id == park_id)
  }

  pub fn parks(&self) -> &[ParkDefinition] { &self.parks }

  pub fn listings(&self) -> Vec<ParkListing> {
    self
      .parks
      .iter()
      .map(|p| ParkListing {
        id:     p.id.clone(),
        name:   p.name.clone(),
        resort: p.resort.clone(),
      })
      .collect()
  }

  /// The eight Walt Disney World and Universal Orlando parks.
  pub fn orlando() -> Self {
    const WDW: &str = "Walt Disney World";
    const UO: &str = "Universal Orlando";

    Self::new(vec![
      park(
        "disney-magic-kingdom",
        "Magic Kingdom",
        WDW,
        &["magic kingdom", "magic kingdom park", "mk", "disney magic kingdom"],
        &[
          "TRON Lightcycle / Run",
          "Seven Dwarfs Mine Train",
          "Space Mountain",
          "Big Thunder Mountain Railroad",
          "Pirates of the Caribbean",
        ],
      ),
      park(
        "disney-epcot",
        "EPCOT",
        WDW,
        &["epcot", "epcot park", "disney epcot"],
        &[
          "Guardians of the Galaxy: Cosmic Rewind",
          "Remy's Ratatouille Adventure",
          "Frozen Ever After",
          "Soarin' Around the World",
          "Test Track",
        ],
      ),
      park(
        "disney-hollywood-studios",
        "Disney's Hollywood Studios",
        WDW,
        &["hollywood studios", "disneys hollywood studios", "dhs"],
        &[
          "Star Wars: Rise of the Resistance",
          "Slinky Dog Dash",
          "Mickey & Minnie's Runaway Railway",
          "The Twilight Zone Tower of Terror",
          "Rock 'n' Roller Coaster",
        ],
      ),
      park(
        "disney-animal-kingdom",
        "Disney's Animal Kingdom",
        WDW,
        &["animal kingdom", "disneys animal kingdom", "dak"],
        &[
          "Avatar Flight of Passage",
          "Na'vi River Journey",
          "Expedition Everest",
          "Kilimanjaro Safaris",
          "DINOSAUR",
        ],
      ),
      park(
        "universal-studios-florida",
        "Universal Studios Florida",
        UO,
        &["universal studios florida", "universal studios", "usf"],
        &[
          "Harry Potter and the Escape from Gringotts",
          "Hollywood Rip Ride Rockit",
          "Transformers: The Ride-3D",
          "Revenge of the Mummy",
          "Despicable Me Minion Mayhem",
        ],
      ),
      park(
        "universal-islands-of-adventure",
        "Universal Islands of Adventure",
        UO,
        &["islands of adventure", "universal islands of adventure", "ioa"],
        &[
          "Hagrid's Magical Creatures Motorbike Adventure",
          "Jurassic World VelociCoaster",
          "The Incredible Hulk Coaster",
          "Harry Potter and the Forbidden Journey",
          "The Amazing Adventures of Spider-Man",
        ],
      ),
      park(
        "universal-epic-universe",
        "Universal Epic Universe",
        UO,
        &["epic universe", "universal epic universe", "universal's epic universe"],
        &[
          "Mario Kart: Bowser's Challenge",
          "Hiccup's Wing Gliders",
          "Monsters Unchained: The Frankenstein Experiment",
          "Stardust Racers",
          "Harry Potter and the Battle at the Ministry",
        ],
      ),
      park(
        "universal-volcano-bay",
        "Universal Volcano Bay",
        UO,
        &["volcano bay", "universal volcano bay", "universal water park"],
        &[
          "Krakatau Aqua Coaster",
          "Ko'okiri Body Plunge",
          "Kala and Tai Nui Serpentine Body Slides",
          "Punga Racers",
          "TeAwa The Fearless River",
        ],
      ),
    ])
  }
}

impl Default for ParkCatalog {
  fn default() -> Self { Self::orlando() }
}

fn park(
  id: &str,
  name: &str,
  resort: &str,
  aliases: &[&str],
  headline: &[&str],
) -> ParkDefinition {
  ParkDefinition {
    id:                   id.to_owned(),
    name:                 name.to_owned(),
    resort:               resort.to_owned(),
    aliases:              aliases.iter().map(|s| (*s).to_owned()).collect(),
    headline_attractions: headline.iter().map(|s| (*s).to_owned()).collect(),
  }
}

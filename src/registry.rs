//! Game-version schema registry
//!
//! Maps a game version (identified by its ROM serial code) to the schema set
//! for its record families. Versions sharing a generation share one
//! [`GameSchemas`] value; schemas are built once on first use and handed out
//! as shared handles.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::schema::{CountRule, FieldRole, FormatCode, FormatNode, Node};

/// A supported game version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameVersion {
    Diamond,
    Pearl,
    Platinum,
    HeartGold,
    SoulSilver,
    Black,
    White,
    Black2,
    White2,
}

impl GameVersion {
    pub const ALL: [GameVersion; 9] = [
        GameVersion::Diamond,
        GameVersion::Pearl,
        GameVersion::Platinum,
        GameVersion::HeartGold,
        GameVersion::SoulSilver,
        GameVersion::Black,
        GameVersion::White,
        GameVersion::Black2,
        GameVersion::White2,
    ];

    /// Resolve a version from the 3-letter serial code in the ROM header
    pub fn from_code(code: &str) -> Option<GameVersion> {
        match code {
            "ADA" => Some(GameVersion::Diamond),
            "APA" => Some(GameVersion::Pearl),
            "CPU" => Some(GameVersion::Platinum),
            "IPK" => Some(GameVersion::HeartGold),
            "IPG" => Some(GameVersion::SoulSilver),
            "IRB" => Some(GameVersion::Black),
            "IRA" => Some(GameVersion::White),
            "IRE" => Some(GameVersion::Black2),
            "IRD" => Some(GameVersion::White2),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GameVersion::Diamond => "ADA",
            GameVersion::Pearl => "APA",
            GameVersion::Platinum => "CPU",
            GameVersion::HeartGold => "IPK",
            GameVersion::SoulSilver => "IPG",
            GameVersion::Black => "IRB",
            GameVersion::White => "IRA",
            GameVersion::Black2 => "IRE",
            GameVersion::White2 => "IRD",
        }
    }

    pub fn generation(&self) -> u8 {
        match self {
            GameVersion::Diamond
            | GameVersion::Pearl
            | GameVersion::Platinum
            | GameVersion::HeartGold
            | GameVersion::SoulSilver => 4,
            GameVersion::Black
            | GameVersion::White
            | GameVersion::Black2
            | GameVersion::White2 => 5,
        }
    }
}

/// Schemas for the record families a version's data files use
#[derive(Debug)]
pub struct GameSchemas {
    /// Per-species base data (one fixed-size record per species)
    pub personal: Node,
    /// Evolution table (seven method/param/species entries per species)
    pub evolution: Node,
    /// Level-up learnset (terminated move list)
    pub level_moves: Node,
}

static REGISTRY: LazyLock<HashMap<GameVersion, Arc<GameSchemas>>> = LazyLock::new(|| {
    let gen4 = Arc::new(GameSchemas {
        personal: gen4_personal(),
        evolution: evolution_table(),
        level_moves: level_moves(FormatCode::U16, 0xFFFF),
    });
    let gen5 = Arc::new(GameSchemas {
        personal: gen5_personal(),
        evolution: evolution_table(),
        level_moves: level_moves(FormatCode::U32, 0xFFFF_FFFF),
    });
    GameVersion::ALL
        .iter()
        .map(|&v| {
            let schemas = if v.generation() == 4 { &gen4 } else { &gen5 };
            (v, Arc::clone(schemas))
        })
        .collect()
});

/// Schema set for a version. Every [`GameVersion`] is registered.
pub fn schemas_for(version: GameVersion) -> Arc<GameSchemas> {
    Arc::clone(&REGISTRY[&version])
}

fn base_stats() -> Vec<Node> {
    ["hp", "atk", "def", "speed", "spatk", "spdef"]
        .into_iter()
        .map(|name| FormatNode::scalar(name, FormatCode::U8))
        .collect()
}

/// Per-species base data, gen 4 layout (44 bytes)
fn gen4_personal() -> Node {
    let mut fields = base_stats();
    fields.extend([
        lookup_u8("type1", "types"),
        lookup_u8("type2", "types"),
        FormatNode::scalar("catchrate", FormatCode::U8),
        FormatNode::scalar("baseexp", FormatCode::U8),
        FormatNode::scalar_role("evs", FormatCode::U16, FieldRole::Bitfield),
        lookup_u16("item1", "items"),
        lookup_u16("item2", "items"),
        FormatNode::scalar("gender", FormatCode::U8),
        FormatNode::scalar("hatchcycles", FormatCode::U8),
        FormatNode::scalar("happiness", FormatCode::U8),
        lookup_u8("exprate", "growth"),
        lookup_u8("egggroup1", "egggroups"),
        lookup_u8("egggroup2", "egggroups"),
        lookup_u8("ability1", "abilities"),
        lookup_u8("ability2", "abilities"),
        FormatNode::scalar("fleerate", FormatCode::U8),
        lookup_u8("color", "colors"),
        FormatNode::skip(2),
        FormatNode::scalar_role("tms", FormatCode::Bytes(13), FieldRole::FlagSet),
        FormatNode::padding(3, 0),
    ]);
    FormatNode::group(fields)
}

/// Per-species base data, gen 5 layout (60 bytes)
fn gen5_personal() -> Node {
    let mut fields = base_stats();
    fields.extend([
        lookup_u8("type1", "types"),
        lookup_u8("type2", "types"),
        FormatNode::scalar("catchrate", FormatCode::U8),
        FormatNode::scalar("stage", FormatCode::U8),
        FormatNode::scalar_role("evs", FormatCode::U16, FieldRole::Bitfield),
        lookup_u16("item1", "items"),
        lookup_u16("item2", "items"),
        lookup_u16("item3", "items"),
        FormatNode::scalar("gender", FormatCode::U8),
        FormatNode::scalar("hatchcycles", FormatCode::U8),
        FormatNode::scalar("happiness", FormatCode::U8),
        lookup_u8("exprate", "growth"),
        lookup_u8("egggroup1", "egggroups"),
        lookup_u8("egggroup2", "egggroups"),
        lookup_u8("ability1", "abilities"),
        lookup_u8("ability2", "abilities"),
        lookup_u8("ability3", "abilities"),
        FormatNode::scalar("fleerate", FormatCode::U8),
        FormatNode::scalar("formid", FormatCode::U16),
        FormatNode::scalar("form", FormatCode::U16),
        FormatNode::scalar("formcount", FormatCode::U8),
        lookup_u8("color", "colors"),
        FormatNode::scalar("baseexp", FormatCode::U16),
        FormatNode::scalar("height", FormatCode::U16),
        FormatNode::scalar("weight", FormatCode::U16),
        FormatNode::scalar_role("tms", FormatCode::Bytes(13), FieldRole::FlagSet),
        FormatNode::scalar_role("typetutors", FormatCode::Bytes(4), FieldRole::FlagSet),
        FormatNode::padding(3, 0),
    ]);
    FormatNode::group(fields)
}

/// Evolution table: seven fixed entries plus trailing padding (44 bytes).
/// Unused entries are all-zero rather than absent.
fn evolution_table() -> Node {
    let entry = FormatNode::group(vec![
        lookup_u16("method", "evomethods"),
        FormatNode::scalar("param", FormatCode::U16),
        lookup_u16("species", "species"),
    ]);
    FormatNode::group(vec![
        FormatNode::array("evolutions", entry, CountRule::Fixed(7), None),
        FormatNode::padding(2, 0),
    ])
}

/// Level-up learnset: packed move/level entries up to an all-ones
/// terminator. Gen 4 packs both into a u16, gen 5 widens to a u32.
fn level_moves(code: FormatCode, terminator: i64) -> Node {
    let entry = FormatNode::scalar("entry", code);
    FormatNode::group(vec![FormatNode::array_role(
        "moves",
        entry,
        CountRule::None,
        Some(terminator),
        FieldRole::Bitfield,
    )])
}

fn lookup_u8(name: &str, table: &str) -> Node {
    FormatNode::scalar_role(name, FormatCode::U8, FieldRole::Lookup(table.to_string()))
}

fn lookup_u16(name: &str, table: &str) -> Node {
    FormatNode::scalar_role(name, FormatCode::U16, FieldRole::Lookup(table.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Value;
    use crate::decode::decode;
    use crate::encode::encode;

    #[test]
    fn test_version_codes() {
        assert_eq!(GameVersion::from_code("ADA"), Some(GameVersion::Diamond));
        assert_eq!(GameVersion::from_code("IRD"), Some(GameVersion::White2));
        assert_eq!(GameVersion::from_code("ZZZ"), None);
        for v in GameVersion::ALL {
            assert_eq!(GameVersion::from_code(v.code()), Some(v));
        }
        assert_eq!(GameVersion::Platinum.generation(), 4);
        assert_eq!(GameVersion::Black.generation(), 5);
    }

    #[test]
    fn test_versions_share_generation_schemas() {
        let d = schemas_for(GameVersion::Diamond);
        let p = schemas_for(GameVersion::Pearl);
        let b = schemas_for(GameVersion::Black);
        assert!(Arc::ptr_eq(&d, &p));
        assert!(!Arc::ptr_eq(&d, &b));
    }

    fn sample_gen4_personal() -> Vec<u8> {
        let mut data = vec![45, 49, 49, 45, 65, 65]; // stats
        data.extend_from_slice(&[12, 3]); // types
        data.extend_from_slice(&[45, 64]); // catchrate, baseexp
        data.extend_from_slice(&[0x04, 0x00]); // evs
        data.extend_from_slice(&[0x11, 0x00, 0x00, 0x00]); // items
        data.extend_from_slice(&[31, 20, 70, 3]); // gender..exprate
        data.extend_from_slice(&[1, 7]); // egg groups
        data.extend_from_slice(&[65, 0]); // abilities
        data.extend_from_slice(&[0, 5]); // fleerate, color
        data.extend_from_slice(&[0, 0]); // unused
        data.extend_from_slice(&[0xAA; 13]); // tms
        data.extend_from_slice(&[0, 0, 0]);
        data
    }

    #[test]
    fn test_gen4_personal_roundtrip() {
        let data = sample_gen4_personal();
        assert_eq!(data.len(), 44);

        let schemas = schemas_for(GameVersion::Diamond);
        let mut atom = decode(&schemas.personal, &data).unwrap();
        assert_eq!(atom.get_int("hp"), Some(45));
        assert_eq!(atom.get_int("type2"), Some(3));
        assert_eq!(atom.get_int("evs"), Some(4));
        assert_eq!(atom.get_int("item1"), Some(0x11));
        assert_eq!(
            atom.get("tms").and_then(Value::as_bytes).map(<[u8]>::len),
            Some(13)
        );
        assert_eq!(encode(&schemas.personal, &atom).unwrap(), data);

        atom.set("hp", 80).unwrap();
        let edited = encode(&schemas.personal, &atom).unwrap();
        assert_eq!(edited[0], 80);
        assert_eq!(edited[1..], data[1..]);
    }

    #[test]
    fn test_personal_roles_drive_editors() {
        let schemas = schemas_for(GameVersion::HeartGold);
        let type1 = schemas.personal.child("type1").unwrap();
        assert_eq!(*type1.role(), FieldRole::Lookup("types".to_string()));
        let evs = schemas.personal.child("evs").unwrap();
        assert_eq!(*evs.role(), FieldRole::Bitfield);
        let tms = schemas.personal.child("tms").unwrap();
        assert_eq!(*tms.role(), FieldRole::FlagSet);
        assert_eq!(*schemas.personal.child("hp").unwrap().role(), FieldRole::Plain);
    }

    #[test]
    fn test_evolution_table_shape() {
        let schemas = schemas_for(GameVersion::Platinum);
        let atom = decode(&schemas.evolution, &[0u8; 44]).unwrap();
        let entries = atom.get("evolutions").and_then(Value::as_list).unwrap();
        assert_eq!(entries.len(), 7);
        let first = entries[0].as_record().unwrap();
        assert_eq!(first.get_int("method"), Some(0));
        assert_eq!(encode(&schemas.evolution, &atom).unwrap(), vec![0u8; 44]);
    }

    #[test]
    fn test_gen4_level_moves_terminator() {
        let schemas = schemas_for(GameVersion::SoulSilver);
        // two packed entries then the 0xFFFF sentinel
        let data = [0x21, 0x02, 0x2D, 0x00, 0xFF, 0xFF];
        let atom = decode(&schemas.level_moves, &data).unwrap();
        let moves = atom.get("moves").and_then(Value::as_list).unwrap();
        assert_eq!(moves, [Value::Int(0x0221), Value::Int(0x002D)]);
        assert_eq!(encode(&schemas.level_moves, &atom).unwrap(), data);
    }

    #[test]
    fn test_gen5_level_moves_are_wide() {
        let schemas = schemas_for(GameVersion::White2);
        let data = [0x21, 0x02, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut atom = decode(&schemas.level_moves, &data).unwrap();
        let moves = atom.get("moves").and_then(Value::as_list).unwrap();
        assert_eq!(moves, [Value::Int(0x0001_0221)]);

        // learnsets grow and shrink freely; the sentinel follows the list
        atom.set(
            "moves",
            vec![Value::Int(0x0001_0221), Value::Int(0x0005_0014)],
        )
        .unwrap();
        let out = encode(&schemas.level_moves, &atom).unwrap();
        assert_eq!(
            out,
            [0x21, 0x02, 0x01, 0x00, 0x14, 0x00, 0x05, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
//! Looking up `colorous` gradients by name.
use colorous::Gradient;
use serde::de::{self, Deserialize, Deserializer};

const GRADIENTS: &[(&str, Gradient)] = &[
    ("BLUES", colorous::BLUES),
    ("BLUE_GREEN", colorous::BLUE_GREEN),
    ("BLUE_PURPLE", colorous::BLUE_PURPLE),
    ("BROWN_GREEN", colorous::BROWN_GREEN),
    ("CIVIDIS", colorous::CIVIDIS),
    ("COOL", colorous::COOL),
    ("CUBEHELIX", colorous::CUBEHELIX),
    ("GREENS", colorous::GREENS),
    ("GREEN_BLUE", colorous::GREEN_BLUE),
    ("GREYS", colorous::GREYS),
    ("INFERNO", colorous::INFERNO),
    ("MAGMA", colorous::MAGMA),
    ("ORANGES", colorous::ORANGES),
    ("ORANGE_RED", colorous::ORANGE_RED),
    ("PINK_GREEN", colorous::PINK_GREEN),
    ("PLASMA", colorous::PLASMA),
    ("PURPLES", colorous::PURPLES),
    ("PURPLE_BLUE", colorous::PURPLE_BLUE),
    ("PURPLE_BLUE_GREEN", colorous::PURPLE_BLUE_GREEN),
    ("PURPLE_GREEN", colorous::PURPLE_GREEN),
    ("PURPLE_ORANGE", colorous::PURPLE_ORANGE),
    ("PURPLE_RED", colorous::PURPLE_RED),
    ("RAINBOW", colorous::RAINBOW),
    ("REDS", colorous::REDS),
    ("RED_BLUE", colorous::RED_BLUE),
    ("RED_GREY", colorous::RED_GREY),
    ("RED_PURPLE", colorous::RED_PURPLE),
    ("RED_YELLOW_BLUE", colorous::RED_YELLOW_BLUE),
    ("RED_YELLOW_GREEN", colorous::RED_YELLOW_GREEN),
    ("SINEBOW", colorous::SINEBOW),
    ("SPECTRAL", colorous::SPECTRAL),
    ("TURBO", colorous::TURBO),
    ("VIRIDIS", colorous::VIRIDIS),
    ("WARM", colorous::WARM),
    ("YELLOW_GREEN", colorous::YELLOW_GREEN),
    ("YELLOW_GREEN_BLUE", colorous::YELLOW_GREEN_BLUE),
    ("YELLOW_ORANGE_BROWN", colorous::YELLOW_ORANGE_BROWN),
    ("YELLOW_ORANGE_RED", colorous::YELLOW_ORANGE_RED),
];

/// Find a gradient by name. Case is ignored, and spaces or dashes can stand in for underscores.
pub(crate) fn from_name(gradient_name: &str) -> Option<Gradient> {
    let normalized = gradient_name
        .trim()
        .to_uppercase()
        .replace(|c| c == ' ' || c == '-', "_");
    GRADIENTS
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, gradient)| *gradient)
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Gradient, D::Error>
where
    D: Deserializer<'de>,
{
    let gradient_name = String::deserialize(deserializer)?;
    from_name(&gradient_name).ok_or_else(|| {
        de::Error::invalid_value(
            de::Unexpected::Str(&gradient_name),
            &"the name of a colorous gradient",
        )
    })
}

#[cfg(test)]
mod gradient_test {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Colors {
        #[serde(deserialize_with = "super::deserialize")]
        colors: colorous::Gradient,
    }

    fn check_parse(gradient_str: &str, expected: colorous::Gradient) {
        let parsed: Colors = toml::from_str(&format!("colors = \"{}\"", gradient_str))
            .unwrap_or_else(|err| panic!("Failed to parse {:?}: {}", gradient_str, err));
        assert_eq!(format!("{:?}", parsed.colors), format!("{:?}", expected));
    }

    #[test]
    fn any_case() {
        check_parse("TURBO", colorous::TURBO);
        check_parse("turbo", colorous::TURBO);
        check_parse("tUrBo", colorous::TURBO);
    }

    #[test]
    fn separators() {
        check_parse("RED_YELLOW_BLUE", colorous::RED_YELLOW_BLUE);
        check_parse("red yellow blue", colorous::RED_YELLOW_BLUE);
        check_parse("red-yellow_blue", colorous::RED_YELLOW_BLUE);
    }

    #[test]
    fn every_name() {
        for (name, gradient) in super::GRADIENTS {
            let found = super::from_name(name).unwrap();
            assert_eq!(format!("{:?}", found), format!("{:?}", gradient));
        }
    }

    #[test]
    fn bad_gradient() {
        assert!(super::from_name("Not A Gradient").is_none());
        let parsed: Result<Colors, _> = toml::from_str("colors = \"ironbow\"");
        assert!(parsed.is_err());
    }
}

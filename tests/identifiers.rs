//! Randomized and exhaustive checks of identifier formatting and parsing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trafcod::{format_identifier, Identifier};

/// Letters that may appear in generated names. `N` is left out since a trailing `N`
/// is read as negation.
const LETTERS: &[u8] = b"ABCDFGHKLMPRSTUVWXYZ";

fn random_name(rng: &mut StdRng) -> String {
    let len = rng.gen_range(1..=3);
    let mut name: String = (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect();
    if rng.gen_bool(0.3) {
        name.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    name
}

/// Parses `text`, prints the result and parses that again, expecting the same variable.
fn assert_round_trip(text: &str) -> bool {
    let Ok(ident) = Identifier::parse(text) else {
        return false;
    };
    let printed = format_identifier(&ident.name, ident.stream, ident.negated);
    let again = Identifier::parse(&printed)
        .unwrap_or_else(|err| panic!("{} -> {} does not parse: {}", text, printed, err));
    assert_eq!(
        (&again.name, again.stream, again.negated),
        (&ident.name, ident.stream, ident.negated),
        "{} -> {}",
        text,
        printed
    );
    true
}

/// Formatting a name, stream and negation and parsing the result gives them back.
#[test]
fn format_then_parse() {
    let mut rng = StdRng::seed_from_u64(0x7c0d);
    for _ in 0..1000 {
        let name = random_name(&mut rng);
        let stream = rng.gen_bool(0.7).then(|| rng.gen_range(0..100));
        let negated = rng.gen_bool(0.5);
        let text = format_identifier(&name, stream, negated);

        let ident = Identifier::parse(&text).unwrap();
        assert_eq!(ident.name, name, "{}", text);
        assert_eq!(ident.stream, stream, "{}", text);
        assert_eq!(ident.negated, negated, "{}", text);
        assert_eq!(ident.len, text.len());
    }
}

/// Every accepted identifier of up to five characters over a small alphabet prints
/// back to the same variable.
#[test]
fn parse_then_format_exhaustive() {
    const ALPHABET: &[u8] = b"ANDB01";
    let mut texts = vec![String::new()];
    let mut accepted = 0;
    for _ in 0..5 {
        texts = texts
            .iter()
            .flat_map(|text| {
                ALPHABET.iter().map(move |c| {
                    let mut text = text.clone();
                    text.push(*c as char);
                    text
                })
            })
            .collect();
        for text in &texts {
            if assert_round_trip(text) {
                accepted += 1;
            }
        }
    }
    assert!(accepted > 1000);
    assert!(!assert_round_trip("0A00"));
}

/// Random identifiers with `N` markers and digits anywhere print back to the same
/// variable whenever they are accepted.
#[test]
fn parse_then_format_random() {
    const ALPHABET: &[u8] = b"ABDGNT0123456789";
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..5000 {
        let len = rng.gen_range(1..=8);
        let text: String = (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        assert_round_trip(&text);
    }
}

/// Parsing stops at the first character that cannot be part of an identifier.
#[test]
fn parse_stops_at_operators() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..200 {
        let name = random_name(&mut rng);
        let stream = Some(rng.gen_range(0..100));
        let text = format!("  {}.{}", format_identifier(&name, stream, false), "X");
        let ident = Identifier::parse(&text).unwrap();
        assert_eq!(ident.name, name);
        assert_eq!(&text[ident.len..], ".X");
    }
}

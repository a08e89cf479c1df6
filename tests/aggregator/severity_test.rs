//! Tests for the severity order.

use guardian::severity::Severity;

const ALL: [Severity; 3] = [Severity::Green, Severity::Yellow, Severity::Red];

#[test]
fn order_is_green_yellow_red() {
    assert!(Severity::Green < Severity::Yellow);
    assert!(Severity::Yellow < Severity::Red);
}

#[test]
fn worse_is_idempotent_and_commutative() {
    for a in ALL {
        assert_eq!(a.worse(a), a);
        for b in ALL {
            assert_eq!(a.worse(b), b.worse(a));
        }
    }
}

#[test]
fn worse_is_associative() {
    for a in ALL {
        for b in ALL {
            for c in ALL {
                assert_eq!(a.worse(b).worse(c), a.worse(b.worse(c)));
            }
        }
    }
}

#[test]
fn glyphs_and_health() {
    assert_eq!(Severity::Green.glyph(), "\u{1f7e2}");
    assert_eq!(Severity::Yellow.glyph(), "\u{1f7e1}");
    assert_eq!(Severity::Red.glyph(), "\u{1f534}");
    assert!(Severity::Green.is_healthy());
    assert!(!Severity::Yellow.is_healthy());
}

#[test]
fn serializes_lowercase() {
    let json = serde_json::to_string(&Severity::Yellow).expect("serialize");
    assert_eq!(json, "\"yellow\"");
}

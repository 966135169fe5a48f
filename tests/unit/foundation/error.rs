use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        StitchError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(StitchError::render("x").to_string().contains("render error:"));
    assert!(StitchError::io("x").to_string().contains("io error:"));
    assert!(
        StitchError::pipeline("x")
            .to_string()
            .contains("pipeline error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("disk on fire");
    let err = StitchError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("disk on fire"));
}

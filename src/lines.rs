//! Speech line text and audio asset names.
//!
//! Each [`LineKey`] resolves to a spoken text per style, plus the wav
//! filename a playback adapter would look up under `assets/<style>/`.
//! The texts are the demo's stage script; styles only change delivery.

use crate::model::{LineKey, SpeechStyle};

/// The spoken text for a line in the given style.
#[must_use]
pub const fn line_text(key: LineKey, style: SpeechStyle) -> &'static str {
    match (key, style) {
        (LineKey::LookDone, SpeechStyle::Polite) => "好，我看好了。",
        (LineKey::LookDone, SpeechStyle::Meme) => "哼，给爷看完了。",
        (LineKey::IWantCheck, SpeechStyle::Polite) => "我要验牌。",
        (LineKey::IWantCheck, SpeechStyle::Meme) => "叫验牌！",
        (LineKey::OkNoProblem, SpeechStyle::Polite) => "牌没有问题。",
        (LineKey::OkNoProblem, SpeechStyle::Meme) => "还得练啊。",
    }
}

/// Wav filename for a line key, relative to `assets/<style>/`.
#[must_use]
pub const fn line_wav(key: LineKey) -> &'static str {
    match key {
        LineKey::LookDone => "look_done.wav",
        LineKey::IWantCheck => "i_want_check.wav",
        LineKey::OkNoProblem => "ok_no_problem.wav",
    }
}

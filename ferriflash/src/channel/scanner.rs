//! Prefix scanning of device output against registered prompts.
//!
//! Matches are anchored: a prompt only counts when it begins at the scan
//! cursor. Bytes that cannot start any prompt (echoes, banners, line noise)
//! are skipped one at a time. Prompts are compared as UTF-8 bytes, so a
//! multi-byte character split across two reads still matches.

/// Unconsumed device output plus the scan over it.
#[derive(Debug, Default)]
pub struct PromptScanner {
    pending: Vec<u8>,
}

impl PromptScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received output.
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Find the next full match, consuming it and everything before it.
    ///
    /// `prompts` is scanned in order at each cursor position; the first
    /// prompt the pending output begins with wins, so when two prompts
    /// share a prefix the earlier one takes precedence. If no prompt
    /// matches but the remaining output is a strict prefix of some prompt,
    /// scanning stops and the output is kept for the next read.
    ///
    /// Returns the index (within `prompts`) of the matched prompt.
    pub fn next_match<'a, I>(&mut self, prompts: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let prompts = prompts.into_iter();
        let mut cursor = 0;

        let found = loop {
            let rest = &self.pending[cursor..];
            if rest.is_empty() {
                break None;
            }

            let full = prompts
                .clone()
                .enumerate()
                .find(|(_, prompt)| rest.starts_with(prompt.as_bytes()));
            if let Some((index, prompt)) = full {
                break Some((index, prompt.len()));
            }

            if prompts.clone().any(|prompt| prompt.as_bytes().starts_with(rest)) {
                break None;
            }

            cursor += 1;
        };

        match found {
            Some((index, len)) => {
                self.pending.drain(..cursor + len);
                Some(index)
            }
            None => {
                self.pending.drain(..cursor);
                None
            }
        }
    }

    /// The unconsumed output.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// The unconsumed output as text (lossy UTF-8 conversion).
    pub fn pending_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.pending)
    }

    /// Drop all unconsumed output.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match_consumes_prompt() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"SSID: ");
        assert_eq!(scanner.next_match(["SSID: "]), Some(0));
        assert!(scanner.pending().is_empty());
    }

    #[test]
    fn test_partial_match_waits() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"SS");
        assert_eq!(scanner.next_match(["SSID: "]), None);
        assert_eq!(scanner.pending(), b"SS");

        scanner.extend(b"ID: ");
        assert_eq!(scanner.next_match(["SSID: "]), Some(0));
        assert!(scanner.pending().is_empty());
    }

    #[test]
    fn test_same_length_mismatch_is_discarded() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"ASDF: ");
        assert_eq!(scanner.next_match(["SSID: "]), None);
        assert!(scanner.pending().is_empty());
    }

    #[test]
    fn test_noise_before_prompt_is_skipped() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"w\r\nSSID: trailing");
        assert_eq!(scanner.next_match(["SSID: "]), Some(0));
        assert_eq!(scanner.pending(), b"trailing");
    }

    #[test]
    fn test_prompt_inside_word_still_found() {
        // Anchored at the cursor, but the cursor walks the whole buffer.
        let mut scanner = PromptScanner::new();
        scanner.extend(b"xxPassword:");
        assert_eq!(scanner.next_match(["Password:"]), Some(0));
    }

    #[test]
    fn test_first_registered_wins_on_shared_prefix() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"Password: ");
        assert_eq!(scanner.next_match(["Pass", "Password:"]), Some(0));
        assert_eq!(scanner.pending(), b"word: ");

        let mut scanner = PromptScanner::new();
        scanner.extend(b"Password: ");
        assert_eq!(scanner.next_match(["Password:", "Pass"]), Some(0));
        assert_eq!(scanner.pending(), b" ");
    }

    #[test]
    fn test_full_match_beats_earlier_partial() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"Security:");
        assert_eq!(
            scanner.next_match(["Security: extended menu", "Security:"]),
            Some(1)
        );
    }

    #[test]
    fn test_split_utf8_prompt() {
        let prompt = "Mot de passe é:";
        let bytes = prompt.as_bytes();
        let split = prompt.find('é').unwrap() + 1;

        let mut scanner = PromptScanner::new();
        scanner.extend(&bytes[..split]);
        assert_eq!(scanner.next_match([prompt]), None);
        scanner.extend(&bytes[split..]);
        assert_eq!(scanner.next_match([prompt]), Some(0));
    }

    #[test]
    fn test_no_prompts_discards_everything() {
        let mut scanner = PromptScanner::new();
        scanner.extend(b"anything");
        assert_eq!(scanner.next_match(std::iter::empty::<&str>()), None);
        assert!(scanner.pending().is_empty());
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Allocates an id for a newly created writeup.
///
/// Ids come from the creation timestamp in milliseconds, but must stay
/// unique and strictly increasing even when the clock collides with (or
/// runs behind) an existing id.
pub fn next_id(existing: &[Writeup]) -> u64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let max_seen = existing.iter().map(|w| w.id).max().unwrap_or(0);
    now_ms.max(max_seen + 1)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Web,
    Crypto,
    Pwn,
    #[serde(rename = "Reverse Engineering")]
    ReverseEngineering,
    Forensics,
    Misc,
    #[serde(rename = "OSINT")]
    Osint,
    Steganography,
    Mobile,
    Blockchain,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Web,
        Category::Crypto,
        Category::Pwn,
        Category::ReverseEngineering,
        Category::Forensics,
        Category::Misc,
        Category::Osint,
        Category::Steganography,
        Category::Mobile,
        Category::Blockchain,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Web => "Web",
            Category::Crypto => "Crypto",
            Category::Pwn => "Pwn",
            Category::ReverseEngineering => "Reverse Engineering",
            Category::Forensics => "Forensics",
            Category::Misc => "Misc",
            Category::Osint => "OSINT",
            Category::Steganography => "Steganography",
            Category::Mobile => "Mobile",
            Category::Blockchain => "Blockchain",
        }
    }

    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.label() == label)
    }

    pub fn next(&self) -> Category {
        let idx = Category::ALL.iter().position(|c| c == self).unwrap_or(0);
        Category::ALL[(idx + 1) % Category::ALL.len()]
    }

    pub fn prev(&self) -> Category {
        let idx = Category::ALL.iter().position(|c| c == self).unwrap_or(0);
        Category::ALL[(idx + Category::ALL.len() - 1) % Category::ALL.len()]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Insane,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Insane,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Insane => "Insane",
        }
    }

    pub fn from_label(label: &str) -> Option<Difficulty> {
        Difficulty::ALL.iter().copied().find(|d| d.label() == label)
    }

    pub fn next(&self) -> Difficulty {
        let idx = Difficulty::ALL.iter().position(|d| d == self).unwrap_or(0);
        Difficulty::ALL[(idx + 1) % Difficulty::ALL.len()]
    }

    pub fn prev(&self) -> Difficulty {
        let idx = Difficulty::ALL.iter().position(|d| d == self).unwrap_or(0);
        Difficulty::ALL[(idx + Difficulty::ALL.len() - 1) % Difficulty::ALL.len()]
    }
}

/// Inline file payload, base64-encoded for storage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Writeup {
    pub id: u64,
    pub title: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub description: String,
    pub solution: String,
    pub flag: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl Writeup {
    /// Field values for a freshly created writeup, before the admin edits it.
    pub fn placeholder(id: u64) -> Writeup {
        Writeup {
            id,
            title: "New Writeup Title".to_string(),
            category: Category::Web,
            difficulty: Difficulty::Easy,
            description: "Start writing your description here.".to_string(),
            solution: "<h2>Start your solution here...</h2>".to_string(),
            flag: "KNU11{}".to_string(),
            author: "Admin".to_string(),
            attachment: None,
        }
    }
}

/// Built-in board contents, used at first run and whenever the stored
/// list fails to decode.
pub fn default_writeups() -> Vec<Writeup> {
    vec![
        Writeup {
            id: 1717920000001,
            title: "Ghost in the Cookie Jar".to_string(),
            category: Category::Web,
            difficulty: Difficulty::Easy,
            description: "A login form that trusts a base64 cookie a little too much. \
                          Forge your way into the admin panel."
                .to_string(),
            solution: "<h2>Recon</h2><p>The session cookie decodes to \
                       <code>{\"user\":\"guest\",\"admin\":false}</code>. No signature, no HMAC.</p>\
                       <h2>Exploit</h2><p>Flip <code>admin</code> to <code>true</code>, re-encode, \
                       reload. The panel renders the flag in a comment.</p>"
                .to_string(),
            flag: "KNU11{s1gn_y0ur_c00k13s}".to_string(),
            author: "ph4ntom".to_string(),
            attachment: None,
        },
        Writeup {
            id: 1717920000002,
            title: "Twin Primes, One Modulus".to_string(),
            category: Category::Crypto,
            difficulty: Difficulty::Medium,
            description: "RSA with p and q chosen a touch too close together. \
                          Fermat would like a word."
                .to_string(),
            solution: "<h2>Observation</h2><p>The 2048-bit modulus factors in seconds with \
                       Fermat's method because |p - q| is tiny.</p><h2>Script</h2>\
                       <pre>a = isqrt(n) + 1\nwhile not is_square(a*a - n): a += 1</pre>\
                       <p>Recover d, decrypt the ciphertext blob.</p>"
                .to_string(),
            flag: "KNU11{ferm4t_st1ll_w1ns}".to_string(),
            author: "m0dex".to_string(),
            attachment: None,
        },
        Writeup {
            id: 1717920000003,
            title: "Stack Smash Saturday".to_string(),
            category: Category::Pwn,
            difficulty: Difficulty::Hard,
            description: "Classic ret2libc on a binary with NX but no canary and no PIE."
                .to_string(),
            solution: "<h2>Setup</h2><p>gets() into a 64-byte buffer, libc 2.31 leaked via \
                       puts@plt.</p><h2>Chain</h2><p>Overflow at offset 72, leak puts, compute \
                       base, second stage ret to system(\"/bin/sh\") with the ret-gadget \
                       alignment fix.</p>"
                .to_string(),
            flag: "KNU11{r3t2l1bc_never_d1es}".to_string(),
            author: "ph4ntom".to_string(),
            attachment: None,
        },
        Writeup {
            id: 1717920000004,
            title: "The Polyglot Postcard".to_string(),
            category: Category::Forensics,
            difficulty: Difficulty::Insane,
            description: "One JPEG, three file formats, and a password-protected surprise \
                          at the end."
                .to_string(),
            solution: "<h2>Layers</h2><p>The postcard is a JPEG/ZIP/PDF polyglot. binwalk \
                       carves a ZIP whose comment field hides the password, spelled in \
                       zero-width characters.</p><h2>Finish</h2><p>Inside: a PDF whose \
                       attached JavaScript assembles the flag from annotation names.</p>"
                .to_string(),
            flag: "KNU11{f1les_w1th1n_f1l3s}".to_string(),
            author: "n0va".to_string(),
            attachment: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_exceeds_every_existing_id() {
        let mut writeups = default_writeups();
        // Simulate a clock running behind the newest id.
        writeups[0].id = u64::MAX - 10;
        let id = next_id(&writeups);
        assert!(writeups.iter().all(|w| w.id < id));
    }

    #[test]
    fn next_id_on_empty_list_is_nonzero() {
        assert!(next_id(&[]) > 0);
    }

    #[test]
    fn category_labels_round_trip() {
        for cat in Category::ALL {
            assert_eq!(Category::from_label(cat.label()), Some(cat));
        }
        assert_eq!(Category::from_label("Reversing"), None);
    }

    #[test]
    fn difficulty_cycling_wraps() {
        assert_eq!(Difficulty::Insane.next(), Difficulty::Easy);
        assert_eq!(Difficulty::Easy.prev(), Difficulty::Insane);
    }

    #[test]
    fn writeup_serializes_with_original_field_names() {
        let mut w = Writeup::placeholder(42);
        w.category = Category::ReverseEngineering;
        w.attachment = Some(Attachment {
            data: "aGVsbG8=".to_string(),
            mime_type: "text/plain".to_string(),
            name: "hello.txt".to_string(),
        });
        let json = serde_json::to_value(&w).expect("serialize");
        assert_eq!(json["category"], "Reverse Engineering");
        assert_eq!(json["attachment"]["mimeType"], "text/plain");
    }

    #[test]
    fn absent_attachment_is_omitted() {
        let w = Writeup::placeholder(1);
        let json = serde_json::to_string(&w).expect("serialize");
        assert!(!json.contains("attachment"));
    }

    #[test]
    fn default_writeups_have_unique_ids() {
        let writeups = default_writeups();
        for (i, a) in writeups.iter().enumerate() {
            for b in &writeups[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }
}

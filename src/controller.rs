use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::info;

use crate::models::{Writeup, next_id};
use crate::{session, store};

/// Screen swaps complete this long after they begin, covering the
/// fade-out the views render while a swap is pending.
pub const FADE_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Listing,
    Viewing(u64),
    LoggingIn,
}

struct PendingSwap {
    target: Screen,
    at: Instant,
}

/// Exclusive owner of the writeup list and the privileged flag. Every
/// state transition runs to completion on the event thread; the store
/// is only a mirror, written after mutations while privileged.
pub struct Controller {
    writeups: Vec<Writeup>,
    privileged: bool,
    screen: Screen,
    pending: Option<PendingSwap>,
    store_path: PathBuf,
    session_path: PathBuf,
}

impl Controller {
    pub fn new(store_path: PathBuf, session_path: PathBuf) -> Controller {
        let writeups = store::load(&store_path);
        let privileged = session::is_privileged(&session_path);
        Controller {
            writeups,
            privileged,
            screen: Screen::Listing,
            pending: None,
            store_path,
            session_path,
        }
    }

    pub fn writeups(&self) -> &[Writeup] {
        &self.writeups
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// True while a screen swap is pending; views dim themselves.
    pub fn is_fading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn viewing(&self) -> Option<&Writeup> {
        match self.screen {
            Screen::Viewing(id) => self.writeups.iter().find(|w| w.id == id),
            _ => None,
        }
    }

    /// Completes a pending screen swap once its deadline has passed.
    /// Returns true when the screen changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(swap) if now >= swap.at => {
                self.screen = swap.target;
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    fn begin_swap(&mut self, target: Screen, now: Instant) {
        self.pending = Some(PendingSwap {
            target,
            at: now + Duration::from_millis(FADE_MS),
        });
    }

    pub fn select(&mut self, id: u64, now: Instant) {
        if self.screen == Screen::Listing && self.writeups.iter().any(|w| w.id == id) {
            self.begin_swap(Screen::Viewing(id), now);
        }
    }

    pub fn back(&mut self, now: Instant) {
        if matches!(self.screen, Screen::Viewing(_)) {
            self.begin_swap(Screen::Listing, now);
        }
    }

    /// Synthesizes a new writeup, prepends it, and opens it for editing.
    /// Returns the new id, or None when unprivileged.
    pub fn create(&mut self, now: Instant) -> Option<u64> {
        if !self.privileged {
            return None;
        }
        let id = next_id(&self.writeups);
        self.writeups.insert(0, Writeup::placeholder(id));
        store::save(&self.store_path, &self.writeups);
        self.begin_swap(Screen::Viewing(id), now);
        Some(id)
    }

    /// Replaces the entry with the matching id. The viewed entry is
    /// referenced by id, so the view picks up the replacement on the
    /// next draw. No-op when unprivileged or the id is unknown.
    pub fn update(&mut self, updated: Writeup) {
        if !self.privileged {
            return;
        }
        if let Some(slot) = self.writeups.iter_mut().find(|w| w.id == updated.id) {
            *slot = updated;
            store::save(&self.store_path, &self.writeups);
        }
    }

    /// Removes the entry with the matching id; confirmation happens in
    /// the UI before this is called. Leaves the detail view if the
    /// removed entry was open.
    pub fn delete(&mut self, id: u64, now: Instant) {
        if !self.privileged {
            return;
        }
        let before = self.writeups.len();
        self.writeups.retain(|w| w.id != id);
        if self.writeups.len() == before {
            return;
        }
        store::save(&self.store_path, &self.writeups);
        if self.screen == Screen::Viewing(id) {
            self.begin_swap(Screen::Listing, now);
        }
        if let Some(swap) = &self.pending {
            if swap.target == Screen::Viewing(id) {
                self.pending = None;
                self.screen = Screen::Listing;
            }
        }
    }

    pub fn open_login(&mut self) {
        if self.screen == Screen::Listing {
            self.screen = Screen::LoggingIn;
        }
    }

    pub fn close_login(&mut self) {
        if self.screen == Screen::LoggingIn {
            self.screen = Screen::Listing;
        }
    }

    /// Reports the outcome of a login attempt. Success grants the
    /// privileged flag, persists it, mirrors the list, and leaves the
    /// login screen; failure changes nothing here (the overlay shows
    /// the error text).
    pub fn login(&mut self, success: bool) {
        if !success {
            return;
        }
        self.privileged = true;
        session::set_privileged(&self.session_path);
        store::save(&self.store_path, &self.writeups);
        info!("admin session opened");
        self.close_login();
    }

    pub fn logout(&mut self) {
        self.privileged = false;
        session::clear_privileged(&self.session_path);
        info!("admin session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_writeups;
    use std::time::Duration;

    fn fresh(privileged: bool) -> (tempfile::TempDir, Controller) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store_path = dir.path().join("writeups.json");
        let session_path = dir.path().join("session");
        if privileged {
            session::set_privileged(&session_path);
        }
        let controller = Controller::new(store_path, session_path);
        (dir, controller)
    }

    fn settled(now: Instant) -> Instant {
        now + Duration::from_millis(FADE_MS + 1)
    }

    #[test]
    fn starts_on_the_listing_with_seed_data() {
        let (_dir, c) = fresh(false);
        assert_eq!(c.screen(), Screen::Listing);
        assert_eq!(c.writeups(), default_writeups().as_slice());
        assert!(!c.privileged());
    }

    #[test]
    fn privileged_flag_survives_a_restart_via_the_session_file() {
        let (dir, mut c) = fresh(false);
        c.open_login();
        c.login(true);
        assert!(c.privileged());

        let again = Controller::new(
            dir.path().join("writeups.json"),
            dir.path().join("session"),
        );
        assert!(again.privileged());
    }

    #[test]
    fn select_swaps_to_viewing_only_after_the_fade() {
        let (_dir, mut c) = fresh(false);
        let id = c.writeups()[0].id;
        let now = Instant::now();
        c.select(id, now);
        assert_eq!(c.screen(), Screen::Listing);
        assert!(c.is_fading());
        assert!(!c.tick(now));
        assert!(c.tick(settled(now)));
        assert_eq!(c.screen(), Screen::Viewing(id));
        assert_eq!(c.viewing().map(|w| w.id), Some(id));
    }

    #[test]
    fn select_of_an_unknown_id_is_a_no_op() {
        let (_dir, mut c) = fresh(false);
        c.select(999, Instant::now());
        assert!(!c.is_fading());
    }

    #[test]
    fn back_returns_to_the_listing() {
        let (_dir, mut c) = fresh(false);
        let id = c.writeups()[0].id;
        let now = Instant::now();
        c.select(id, now);
        c.tick(settled(now));
        c.back(settled(now));
        c.tick(settled(settled(now)));
        assert_eq!(c.screen(), Screen::Listing);
    }

    #[test]
    fn create_prepends_a_unique_id_and_opens_it() {
        let (_dir, mut c) = fresh(true);
        let now = Instant::now();
        let existing: Vec<u64> = c.writeups().iter().map(|w| w.id).collect();
        let id = c.create(now).expect("privileged create");
        assert!(!existing.contains(&id));
        assert_eq!(c.writeups()[0].id, id);
        c.tick(settled(now));
        assert_eq!(c.screen(), Screen::Viewing(id));
    }

    #[test]
    fn unprivileged_mutations_are_no_ops() {
        let (dir, mut c) = fresh(false);
        let before = c.writeups().to_vec();
        assert_eq!(c.create(Instant::now()), None);
        let mut tweaked = before[0].clone();
        tweaked.title = "defaced".to_string();
        c.update(tweaked);
        c.delete(before[1].id, Instant::now());
        assert_eq!(c.writeups(), before.as_slice());
        // Nothing may touch the mirror either.
        assert!(!dir.path().join("writeups.json").exists());
    }

    #[test]
    fn update_replaces_only_the_targeted_entry() {
        let (_dir, mut c) = fresh(true);
        let others: Vec<Writeup> = c.writeups()[1..].to_vec();
        let mut edited = c.writeups()[0].clone();
        edited.flag = "KNU11{ed1ted}".to_string();
        c.update(edited.clone());
        assert_eq!(c.writeups()[0], edited);
        assert_eq!(&c.writeups()[1..], others.as_slice());
    }

    #[test]
    fn update_with_an_unknown_id_changes_nothing() {
        let (_dir, mut c) = fresh(true);
        let before = c.writeups().to_vec();
        let mut ghost = before[0].clone();
        ghost.id = 424242;
        c.update(ghost);
        assert_eq!(c.writeups(), before.as_slice());
    }

    #[test]
    fn delete_removes_exactly_one_entry() {
        let (_dir, mut c) = fresh(true);
        let id = c.writeups()[1].id;
        let before = c.writeups().len();
        c.delete(id, Instant::now());
        assert_eq!(c.writeups().len(), before - 1);
        assert!(c.writeups().iter().all(|w| w.id != id));
    }

    #[test]
    fn deleting_the_viewed_entry_returns_to_the_listing() {
        let (_dir, mut c) = fresh(true);
        let id = c.writeups()[0].id;
        let now = Instant::now();
        c.select(id, now);
        c.tick(settled(now));
        c.delete(id, settled(now));
        c.tick(settled(settled(now)));
        assert_eq!(c.screen(), Screen::Listing);
    }

    #[test]
    fn privileged_mutations_reach_the_store() {
        let (dir, mut c) = fresh(true);
        let id = c.create(Instant::now()).expect("create");
        let stored = store::load(&dir.path().join("writeups.json"));
        assert_eq!(stored[0].id, id);
    }

    #[test]
    fn failed_login_grants_nothing() {
        let (_dir, mut c) = fresh(false);
        c.open_login();
        c.login(false);
        assert!(!c.privileged());
        assert_eq!(c.screen(), Screen::LoggingIn);
    }

    #[test]
    fn logout_clears_the_flag_and_the_session_file() {
        let (dir, mut c) = fresh(true);
        c.logout();
        assert!(!c.privileged());
        assert!(!session::is_privileged(&dir.path().join("session")));
    }
}

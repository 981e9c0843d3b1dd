//! Front cache for host bitmap loading.
//!
//! Filenames starting with `!` are authoring placeholders and always resolve to one shared 1x1
//! bitmap, and hues are wrapped into `0..360` so equivalent requests share a cache slot.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;

pub const PLACEHOLDER_PREFIX: char = '!';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub source: String,
}

impl Bitmap {
    pub fn placeholder() -> Self {
        Self { width: 1, height: 1, source: String::new() }
    }
}

pub trait BitmapLoader {
    fn load(&mut self, folder: &str, filename: &str, hue: u16) -> Result<Bitmap>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub folder: String,
    pub filename: String,
    pub hue: u16,
}

impl CacheKey {
    /// `None` for placeholder and empty filenames.
    pub fn normalize(folder: &str, filename: &str, hue: i32) -> Option<Self> {
        if filename.is_empty() || filename.starts_with(PLACEHOLDER_PREFIX) {
            return None;
        }
        Some(Self { folder: folder.to_string(), filename: filename.to_string(), hue: wrap_hue(hue) })
    }
}

pub fn wrap_hue(hue: i32) -> u16 {
    hue.rem_euclid(360) as u16
}

pub struct BitmapCache {
    loader: Box<dyn BitmapLoader>,
    entries: HashMap<CacheKey, Rc<Bitmap>>,
    placeholder: Rc<Bitmap>,
}

impl BitmapCache {
    pub fn new(loader: Box<dyn BitmapLoader>) -> Self {
        Self { loader, entries: HashMap::new(), placeholder: Rc::new(Bitmap::placeholder()) }
    }

    pub fn load(&mut self, folder: &str, filename: &str, hue: i32) -> Result<Rc<Bitmap>> {
        let Some(key) = CacheKey::normalize(folder, filename, hue) else {
            return Ok(Rc::clone(&self.placeholder));
        };
        if let Some(bitmap) = self.entries.get(&key) {
            return Ok(Rc::clone(bitmap));
        }
        let bitmap = Rc::new(self.loader.load(&key.folder, &key.filename, key.hue)?);
        self.entries.insert(key, Rc::clone(&bitmap));
        Ok(bitmap)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Loader for headless sessions: every request yields a 32x32 bitmap named after the file.
#[derive(Debug, Default)]
pub struct NullBitmapLoader {
    pub loads: usize,
}

impl BitmapLoader for NullBitmapLoader {
    fn load(&mut self, folder: &str, filename: &str, _hue: u16) -> Result<Bitmap> {
        self.loads += 1;
        Ok(Bitmap { width: 32, height: 32, source: format!("{folder}/{filename}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingLoader(Rc<Cell<usize>>);

    impl BitmapLoader for CountingLoader {
        fn load(&mut self, folder: &str, filename: &str, hue: u16) -> Result<Bitmap> {
            self.0.set(self.0.get() + 1);
            Ok(Bitmap { width: 32, height: 32, source: format!("{folder}/{filename}@{hue}") })
        }
    }

    #[test]
    fn hue_wraps_into_range() {
        assert_eq!(wrap_hue(0), 0);
        assert_eq!(wrap_hue(360), 0);
        assert_eq!(wrap_hue(725), 5);
        assert_eq!(wrap_hue(-30), 330);
    }

    #[test]
    fn placeholders_skip_the_loader() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = BitmapCache::new(Box::new(CountingLoader(Rc::clone(&calls))));
        let bitmap = cache.load("Graphics/Characters", "!marker", 0).expect("placeholder");
        assert_eq!((bitmap.width, bitmap.height), (1, 1));
        assert_eq!(calls.get(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn equivalent_hues_share_one_entry() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = BitmapCache::new(Box::new(CountingLoader(Rc::clone(&calls))));
        let a = cache.load("Graphics/Characters", "hero", -90).expect("load");
        let b = cache.load("Graphics/Characters", "hero", 270).expect("load");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
        assert_eq!(a.source, "Graphics/Characters/hero@270");
        cache.clear();
        cache.load("Graphics/Characters", "hero", 270).expect("reload");
        assert_eq!(calls.get(), 2);
    }
}

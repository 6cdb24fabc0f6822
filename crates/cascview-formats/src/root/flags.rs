//! Locale and content flags of root blocks

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

/// Locales a root block applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LocaleFlags(pub u32);

const LOCALE_CODES: [(&str, u32); 16] = [
    ("enUS", 0x2),
    ("koKR", 0x4),
    ("frFR", 0x10),
    ("deDE", 0x20),
    ("zhCN", 0x40),
    ("esES", 0x80),
    ("zhTW", 0x100),
    ("enGB", 0x200),
    ("enCN", 0x400),
    ("enTW", 0x800),
    ("esMX", 0x1000),
    ("ruRU", 0x2000),
    ("ptBR", 0x4000),
    ("itIT", 0x8000),
    ("ptPT", 0x1_0000),
    ("enSG", 0x2000_0000),
];

impl LocaleFlags {
    /// No locale; invalid for a root block
    pub const NONE: Self = Self(0);
    /// Every locale
    pub const ALL: Self = Self(0xFFFF_FFFF);
    /// English (US)
    pub const EN_US: Self = Self(0x2);
    /// Korean
    pub const KO_KR: Self = Self(0x4);
    /// French
    pub const FR_FR: Self = Self(0x10);
    /// German
    pub const DE_DE: Self = Self(0x20);
    /// Chinese (simplified)
    pub const ZH_CN: Self = Self(0x40);
    /// Spanish (Spain)
    pub const ES_ES: Self = Self(0x80);
    /// Chinese (traditional)
    pub const ZH_TW: Self = Self(0x100);
    /// English (UK)
    pub const EN_GB: Self = Self(0x200);
    /// Spanish (Mexico)
    pub const ES_MX: Self = Self(0x1000);
    /// Russian
    pub const RU_RU: Self = Self(0x2000);
    /// Portuguese (Brazil)
    pub const PT_BR: Self = Self(0x4000);
    /// Italian
    pub const IT_IT: Self = Self(0x8000);

    /// Whether any locale is shared with `other`
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no locale bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Flag for a locale code such as `enUS`, case-insensitive
    pub fn from_code(code: &str) -> Option<Self> {
        if code.eq_ignore_ascii_case("all") {
            return Some(Self::ALL);
        }
        LOCALE_CODES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(code))
            .map(|&(_, bits)| Self(bits))
    }

    /// Locale codes of every set bit
    pub fn codes(self) -> Vec<&'static str> {
        LOCALE_CODES
            .iter()
            .filter(|&&(_, bits)| self.0 & bits != 0)
            .map(|&(name, _)| name)
            .collect()
    }
}

impl FromStr for LocaleFlags {
    type Err = String;

    /// Parse `enUS`, `enUS|deDE`, `all` or a hex mask like `0x22`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|e| format!("invalid locale mask {s}: {e}"));
        }
        s.split(['|', ',', '+'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(Self::NONE, |acc, part| {
                Self::from_code(part)
                    .map(|flag| acc | flag)
                    .ok_or_else(|| format!("unknown locale {part}"))
            })
    }
}

impl fmt::Display for LocaleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ALL => f.write_str("all"),
            Self::NONE => f.write_str("none"),
            flags => {
                let codes = flags.codes();
                if codes.is_empty() {
                    write!(f, "0x{:08X}", flags.0)
                } else {
                    f.write_str(&codes.join("|"))
                }
            }
        }
    }
}

/// Content variant of a root block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentFlags(pub u32);

impl ContentFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Installed by default
    pub const INSTALL: Self = Self(0x4);
    /// Windows client
    pub const LOAD_ON_WINDOWS: Self = Self(0x8);
    /// macOS client
    pub const LOAD_ON_MACOS: Self = Self(0x10);
    /// Low-violence variant
    pub const LOW_VIOLENCE: Self = Self(0x80);
    /// Not loaded by the client
    pub const DO_NOT_LOAD: Self = Self(0x100);
    /// Launcher update plugin
    pub const UPDATE_PLUGIN: Self = Self(0x800);
    /// Encrypted content
    pub const ENCRYPTED: Self = Self(0x0800_0000);
    /// Block has no name hash array
    pub const NO_NAME_HASH: Self = Self(0x1000_0000);
    /// Uncommon resolution assets
    pub const UNCOMMON_RESOLUTION: Self = Self(0x2000_0000);
    /// Bundled file
    pub const BUNDLE: Self = Self(0x4000_0000);
    /// Stored without compression
    pub const NO_COMPRESSION: Self = Self(0x8000_0000);

    /// Whether every bit of `flag` is set
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl FromStr for ContentFlags {
    type Err = String;

    /// Parse `none`, a flag name like `low_violence`, or a hex mask
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|e| format!("invalid content mask {s}: {e}"));
        }
        let flag = match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Self::NONE,
            "install" => Self::INSTALL,
            "windows" | "load_on_windows" => Self::LOAD_ON_WINDOWS,
            "macos" | "load_on_macos" => Self::LOAD_ON_MACOS,
            "low_violence" => Self::LOW_VIOLENCE,
            other => return Err(format!("unknown content flag {other}")),
        };
        Ok(flag)
    }
}

impl fmt::Display for ContentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

macro_rules! bit_ops {
    ($name:ident) => {
        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }
    };
}

bit_ops!(LocaleFlags);
bit_ops!(ContentFlags);

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_parsing() {
        assert_eq!("enUS".parse::<LocaleFlags>().unwrap(), LocaleFlags::EN_US);
        assert_eq!(
            "enus|DEDE".parse::<LocaleFlags>().unwrap(),
            LocaleFlags::EN_US | LocaleFlags::DE_DE
        );
        assert_eq!("all".parse::<LocaleFlags>().unwrap(), LocaleFlags::ALL);
        assert_eq!("0x22".parse::<LocaleFlags>().unwrap(), LocaleFlags(0x22));
        assert!("xxYY".parse::<LocaleFlags>().is_err());
    }

    #[test]
    fn test_locale_display() {
        assert_eq!((LocaleFlags::EN_US | LocaleFlags::DE_DE).to_string(), "enUS|deDE");
        assert_eq!(LocaleFlags::ALL.to_string(), "all");
    }

    #[test]
    fn test_intersects() {
        let both = LocaleFlags::EN_US | LocaleFlags::DE_DE;
        assert!(both.intersects(LocaleFlags::EN_US));
        assert!(!LocaleFlags::DE_DE.intersects(LocaleFlags::EN_US));
        assert!(LocaleFlags::ALL.intersects(LocaleFlags::RU_RU));
    }

    #[test]
    fn test_content_flags() {
        let flags = ContentFlags::LOAD_ON_WINDOWS | ContentFlags::NO_NAME_HASH;
        assert!(flags.contains(ContentFlags::NO_NAME_HASH));
        assert!(!flags.contains(ContentFlags::LOW_VIOLENCE));
        assert_eq!(
            "low-violence".parse::<ContentFlags>().unwrap(),
            ContentFlags::LOW_VIOLENCE
        );
    }
}

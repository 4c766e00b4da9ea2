use std::fmt;

/// Mechanisms our reference engines know how to drive.
/// The wire itself carries any mechanism name, see [`MechanismList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }

    /// SASL mechanism names are case insensitive
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Plain, Self::Login]
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mechanism names in the server's preference order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MechanismList(pub Vec<String>);

impl MechanismList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|m| m.as_str())
    }
}

impl From<&[Mechanism]> for MechanismList {
    fn from(mechs: &[Mechanism]) -> Self {
        Self(mechs.iter().map(|m| m.name().to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// First line sent by the server, space separated.
    Mechanisms(MechanismList),
    /// `C` when the payload is empty, `C,<base64>` otherwise.
    Step(Vec<u8>),
    /// `A`, terminal.
    Success,
    /// `E`, terminal.
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// `<mechanism>[ <base64>]`, the initial response is optional
    /// and distinct from an empty initial response.
    FirstStep {
        mechanism: String,
        initial_response: Option<Vec<u8>>,
    },
    /// `C` when the payload is empty, `C,<base64>` otherwise.
    Step(Vec<u8>),
}

//! Binary persistence of compiled images.
//!
//! A [`CompiledImage`] bundles the action table, every published LTS and the
//! progress properties of a compilation; `postcard` provides the wire format.
//! Round-tripping is lossless: node indices, type tags and alphabets are
//! stored verbatim.

use fspx_core::{ActionTable, ProgressSpec};

use crate::graph::Lts;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("image encoding failed: {0}")]
    Encode(#[source] postcard::Error),
    #[error("image decoding failed: {0}")]
    Decode(#[source] postcard::Error),
}

/// The persistent form of a compilation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompiledImage {
    pub actions: ActionTable,
    pub processes: Vec<Lts>,
    pub progresses: Vec<(String, ProgressSpec)>,
}

impl CompiledImage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(self).map_err(CodecError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        postcard::from_bytes(bytes).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;
    use fspx_core::{ActionSet, LabelSet};

    #[test]
    fn image_round_trip() {
        let mut at = ActionTable::new();
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::end(), "a", &mut at);
        lts.zerocat(&Lts::error(), "b", &mut at);
        let mut hide = LabelSet::new();
        hide.push("b");
        lts.hiding(
            &fspx_core::HidingSpec {
                set: hide,
                interface: false,
            },
            &at,
        );
        lts.name = "P".to_owned();

        let mut set = ActionSet::new();
        set.add(at.lookup("a").unwrap());
        let image = CompiledImage {
            actions: at,
            processes: vec![lts],
            progresses: vec![(
                "LIVE".to_owned(),
                ProgressSpec {
                    condition: None,
                    set,
                },
            )],
        };

        let bytes = image.to_bytes().unwrap();
        let loaded = CompiledImage::from_bytes(&bytes).unwrap();

        assert_eq!(loaded.processes.len(), 1);
        let p = &loaded.processes[0];
        assert_eq!(p.name, "P");
        assert_eq!(p.num_states(), image.processes[0].num_states());
        assert_eq!(p.num_transitions(), image.processes[0].num_transitions());
        assert_eq!(p.alphabet(), image.processes[0].alphabet());
        for i in 0..p.num_states() as u32 {
            assert_eq!(p.node_type(i), image.processes[0].node_type(i));
            assert_eq!(p.edges(i), image.processes[0].edges(i));
        }
        assert_eq!(
            loaded.actions.lookup("a"),
            image.actions.lookup("a")
        );
        assert_eq!(loaded.progresses, image.progresses);
        // The End/Error sentinels survive.
        assert!(
            (0..p.num_states() as u32).any(|i| p.node_type(i) == NodeType::End)
        );
        assert!(
            (0..p.num_states() as u32).any(|i| p.node_type(i) == NodeType::Error)
        );
    }
}

//! Proptest strategies over head parameters.

use proptest::prelude::*;

use rockpool_core::{Blake3Hash, Head, HeadBuilder, LocalIdentity};

/// Parameters from which a deterministic head can be built.
#[derive(Debug, Clone)]
pub struct HeadParams {
    pub id: u64,
    pub name: String,
    pub body: Vec<u8>,
    pub ctime: i64,
    pub author_seed: [u8; 32],
}

impl Arbitrary for HeadParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: ()) -> Self::Strategy {
        (
            any::<u64>(),
            "[a-z]{1,8}/[a-z0-9]{1,16}",
            proptest::collection::vec(any::<u8>(), 0..1024),
            0i64..4_102_444_800_000,
            any::<[u8; 32]>(),
        )
            .prop_map(|(id, name, body, ctime, author_seed)| HeadParams {
                id,
                name,
                body,
                ctime,
                author_seed,
            })
            .boxed()
    }
}

/// Build the head described by the parameters. Deterministic: the same
/// parameters always produce the same signed bytes.
pub fn head_from_params(params: &HeadParams) -> Head {
    let author = LocalIdentity::from_seeds(&params.author_seed, &params.author_seed, "gen");
    let mod_time = chrono::DateTime::from_timestamp_millis(params.ctime).expect("ctime in range");
    HeadBuilder::new(params.id, &params.name)
        .size(params.body.len() as i64)
        .hash(Blake3Hash::hash(&params.body))
        .ctime(params.ctime)
        .mod_time(mod_time)
        .sign(&author)
        .expect("signing a generated head")
}

//! Chain-name normalization.
//!
//! Upstream datasets spell the same chain several ways (`optimism`, `OP Mainnet`, `op-mainnet`)
//! and suffix TVL adjustments onto chain keys (`Ethereum-staking`). Everything that keys rows or
//! breakdowns by chain goes through these helpers.

pub const TVL_ADJUSTMENT_SUFFIXES: [&str; 7] = [
    "staking",
    "pool2",
    "doublecounted",
    "liquidstaking",
    "borrowed",
    "vesting",
    "offers",
];

/// Display name for a chain, or the input unchanged when it is not a known alias.
pub fn normalize_chain_name(raw: &str) -> String {
    let lc = raw.trim().to_lowercase();
    match display_name_for(&lc) {
        Some(name) => name.to_string(),
        None => raw.to_string(),
    }
}

fn display_name_for(lc: &str) -> Option<&'static str> {
    let name = match lc {
        "op mainnet" | "op-mainnet" | "optimism" => "OP Mainnet",
        "gnosis" | "xdai" => "Gnosis",
        "hyperliquid l1" | "hyperliquid" | "hyperliquid-l1" | "hyperliquid_l1" => "Hyperliquid L1",
        "zksync era" | "zksync" | "zksync-era" | "zksync_era" | "era" => "ZKsync Era",
        "polygon zkevm" | "polygon-zkevm" | "polygon_zkevm" => "Polygon zkEVM",
        "immutable zkevm" | "immutable-zkevm" | "immutable_zkevm" | "imx" | "immutablex" => {
            "Immutable zkEVM"
        }
        "cronos zkevm" | "cronos-zkevm" | "cronos_zkevm" => "Cronos zkEVM",
        "arbitrum nova" | "arbitrum-nova" | "arbitrum_nova" => "Arbitrum Nova",
        "bsc" | "binance" | "binance smart chain" => "BSC",
        "avalanche" | "avax" => "Avalanche",
        "cosmoshub" | "cosmos" => "CosmosHub",
        "pulsechain" | "pulse" => "PulseChain",
        "eos evm" | "eos" => "EOS EVM",
        "opbnb" | "op_bnb" | "op-bnb" => "opBNB",
        "x layer" | "x-layer" | "xlayer" => "X Layer",
        "sx network" | "sx-network" | "sx_network" | "sxnetwork" => "SX Network",
        "shimmerevm" | "shimmer_evm" | "shimmer-evm" => "ShimmerEVM",
        "iota evm" | "iota-evm" | "iotaevm" | "iota_evm" => "IOTA EVM",
        "plume mainnet" | "plume-mainnet" | "plume_mainnet" => "Plume Mainnet",
        "asset chain" | "asset-chain" | "assetchain" => "Asset Chain",
        "defichain evm" | "defichain-evm" | "defichain_evm" => "DeFiChain EVM",
        "zero network" | "zero-network" | "zero_network" => "Zero Network",
        "ethereumclassic" | "ethereum-classic" | "ethereum_classic" => "EthereumClassic",
        "godwokenv1" | "godwoken_v1" | "godwoken-v1" => "GodwokenV1",
        "ontologyevm" | "ontology_evm" | "ontology-evm" => "OntologyEVM",
        "off chain" | "off-chain" | "off_chain" => "Off Chain",
        "bitcoincash" | "bitcoin-cash" | "bitcoin_cash" => "Bitcoincash",
        "soonbase" | "soon_base" => "soonBase",
        "xrpl evm" | "xrpl-evm" | "xrplevm" | "xrpl_evm" => "XRPL EVM",
        "ethereum" => "Ethereum",
        "arbitrum" => "Arbitrum",
        "polygon" => "Polygon",
        "base" => "Base",
        "solana" => "Solana",
        "bitcoin" => "Bitcoin",
        "tron" => "Tron",
        "sui" => "Sui",
        "aptos" => "Aptos",
        "ton" => "TON",
        "near" => "Near",
        "fantom" => "Fantom",
        "celo" => "Celo",
        "moonbeam" => "Moonbeam",
        "moonriver" => "Moonriver",
        "harmony" => "Harmony",
        "cronos" => "Cronos",
        "kava" => "Kava",
        "linea" => "Linea",
        "scroll" => "Scroll",
        "mantle" => "Mantle",
        "blast" => "Blast",
        "mode" => "Mode",
        "manta" => "Manta",
        "sei" => "Sei",
        "injective" => "Injective",
        "osmosis" => "Osmosis",
        "starknet" => "Starknet",
        "ronin" => "Ronin",
        "metis" => "Metis",
        "boba" => "Boba",
        "aurora" => "Aurora",
        "canto" => "Canto",
        "evmos" => "Evmos",
        "klaytn" => "Klaytn",
        "fuse" => "Fuse",
        "astar" => "Astar",
        "telos" => "Telos",
        "zora" => "Zora",
        "fraxtal" => "Fraxtal",
        "taiko" => "Taiko",
        "zklink" => "zkLink",
        "bob" => "BOB",
        "merlin" => "Merlin",
        "berachain" => "Berachain",
        "sonic" => "Sonic",
        "abstract" => "Abstract",
        "ink" => "Ink",
        "unichain" => "Unichain",
        "soneium" => "Soneium",
        "morph" => "Morph",
        "corn" => "Corn",
        "hemi" => "Hemi",
        "sophon" => "Sophon",
        "dydx" => "dYdX",
        "hedera" => "Hedera",
        "cardano" => "Cardano",
        "algorand" => "Algorand",
        "flow" => "Flow",
        "icp" => "ICP",
        "tezos" => "Tezos",
        "waves" => "Waves",
        "stellar" => "Stellar",
        "ripple" => "Ripple",
        "filecoin" => "Filecoin",
        "flare" => "Flare",
        "thorchain" => "Thorchain",
        "stacks" => "Stacks",
        "goat" => "GOAT",
        "grvt" => "GRVT",
        "edgex" => "edgeX",
        _ => return None,
    };
    Some(name)
}

fn slug_alias(lc: &str) -> Option<&'static str> {
    let slug = match lc {
        "optimism" | "op mainnet" => "op-mainnet",
        "binance" => "bsc",
        "xdai" => "gnosis",
        "cosmos" => "cosmoshub",
        "pulse" => "pulsechain",
        "hyperliquid" | "hyperliquid l1" | "hyperliquid_l1" => "hyperliquid-l1",
        "zksync" | "zksync era" | "zksync_era" | "era" => "zksync-era",
        "polygon zkevm" | "polygon_zkevm" => "polygon-zkevm",
        "immutable zkevm" | "immutable_zkevm" | "imx" | "immutablex" => "immutable-zkevm",
        "cronos zkevm" | "cronos_zkevm" => "cronos-zkevm",
        "arbitrum nova" | "arbitrum_nova" => "arbitrum-nova",
        "avax" => "avalanche",
        _ => return None,
    };
    Some(slug)
}

/// URL slug for a chain: alias table first, then a mechanical slugification.
pub fn to_chain_slug(raw: &str) -> String {
    let lc = raw.trim().to_lowercase();
    if let Some(slug) = slug_alias(&lc) {
        return slug.to_string();
    }

    let mut slug = String::with_capacity(lc.len());
    let mut in_whitespace = false;
    for ch in lc.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' {
            slug.push(ch);
        }
    }

    match slug_alias(&slug) {
        Some(alias) => alias.to_string(),
        None => slug,
    }
}

/// Slug used by the dimension overview endpoints (`/overview/fees/{slug}`).
pub fn to_dimensions_slug(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let normalized = normalize_chain_name(raw);
    match normalized.as_str() {
        "OP Mainnet" => "optimism".to_string(),
        "Gnosis" => "xdai".to_string(),
        "Hyperliquid L1" => "hyperliquid".to_string(),
        "ZKsync Era" => "era".to_string(),
        "Polygon zkEVM" => "polygon_zkevm".to_string(),
        "Immutable zkEVM" => "imx".to_string(),
        "Cronos zkEVM" => "cronos_zkevm".to_string(),
        "Arbitrum Nova" => "arbitrum_nova".to_string(),
        "BSC" => "bsc".to_string(),
        "Avalanche" => "avax".to_string(),
        "CosmosHub" => "cosmoshub".to_string(),
        "PulseChain" => "pulse".to_string(),
        other => other
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_"),
    }
}

/// Key used by per-chain breakdown maps.
pub fn chain_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_same_chain(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && normalize_chain_name(a) == normalize_chain_name(b)
}

/// Id-safe token: lowercase, runs of anything outside `[a-z0-9]` collapsed to `-`.
pub fn normalize_id(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash {
                out.push('-');
                pending_dash = false;
            }
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if pending_dash {
        out.push('-');
    }
    out
}

pub fn is_adjustment_suffix(value: &str) -> bool {
    TVL_ADJUSTMENT_SUFFIXES.contains(&value.to_lowercase().as_str())
}

/// Splits a `chainTvls` key into its chain and optional adjustment suffix.
///
/// `"Ethereum-staking"` yields `("Ethereum", Some("staking"))`. A bare suffix such as `"pool2"`
/// is a protocol-level adjustment and yields an empty chain.
pub fn split_chain_tvl_key(key: &str) -> (&str, Option<&'static str>) {
    if let Some(suffix) = match_suffix(key) {
        return ("", Some(suffix));
    }
    if let Some((chain, suffix)) = key.rsplit_once('-') {
        if let Some(found) = match_suffix(suffix) {
            return (chain, Some(found));
        }
    }
    (key, None)
}

fn match_suffix(value: &str) -> Option<&'static str> {
    TVL_ADJUSTMENT_SUFFIXES
        .iter()
        .copied()
        .find(|suffix| suffix.eq_ignore_ascii_case(value))
}

/// Display chain for a `chainTvls` or breakdown key, `None` for protocol-level adjustments.
pub fn display_chain_for_key(key: &str) -> Option<String> {
    let (chain, _) = split_chain_tvl_key(key);
    let chain = chain.trim();
    if chain.is_empty() {
        return None;
    }
    Some(normalize_chain_name(chain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_collapse_to_display_names() {
        assert_eq!(normalize_chain_name("optimism"), "OP Mainnet");
        assert_eq!(normalize_chain_name(" Binance "), "BSC");
        assert_eq!(normalize_chain_name("avax"), "Avalanche");
        assert_eq!(normalize_chain_name("xDai"), "Gnosis");
        assert_eq!(normalize_chain_name("zksync_era"), "ZKsync Era");
        assert_eq!(normalize_chain_name("ethereum"), "Ethereum");
    }

    #[test]
    fn unknown_chains_are_returned_unchanged() {
        assert_eq!(normalize_chain_name("Megachain"), "Megachain");
        assert_eq!(normalize_chain_name(""), "");
    }

    #[test]
    fn slugs_use_alias_table_then_slugify() {
        assert_eq!(to_chain_slug("Optimism"), "op-mainnet");
        assert_eq!(to_chain_slug("Arbitrum Nova"), "arbitrum-nova");
        assert_eq!(to_chain_slug("Some  Odd.Chain!"), "some-oddchain");
        assert_eq!(to_chain_slug("zksync era"), "zksync-era");
    }

    #[test]
    fn dimensions_slug_prefers_overview_names() {
        assert_eq!(to_dimensions_slug("OP Mainnet"), "optimism");
        assert_eq!(to_dimensions_slug("avalanche"), "avax");
        assert_eq!(to_dimensions_slug("Ethereum"), "ethereum");
        assert_eq!(to_dimensions_slug("Plume Mainnet"), "plume_mainnet");
    }

    #[test]
    fn tvl_keys_split_off_adjustment_suffixes() {
        assert_eq!(
            split_chain_tvl_key("Ethereum-staking"),
            ("Ethereum", Some("staking"))
        );
        assert_eq!(split_chain_tvl_key("pool2"), ("", Some("pool2")));
        assert_eq!(split_chain_tvl_key("op-mainnet"), ("op-mainnet", None));
        assert_eq!(split_chain_tvl_key("Ethereum"), ("Ethereum", None));
    }

    #[test]
    fn suffixed_and_plain_keys_share_a_display_chain() {
        assert_eq!(
            display_chain_for_key("Ethereum-staking"),
            display_chain_for_key("Ethereum")
        );
        assert_eq!(
            display_chain_for_key("optimism-pool2").as_deref(),
            Some("OP Mainnet")
        );
        assert_eq!(display_chain_for_key("borrowed"), None);
    }

    #[test]
    fn ids_collapse_non_alphanumerics() {
        assert_eq!(normalize_id("OP Mainnet"), "op-mainnet");
        assert_eq!(normalize_id("Uniswap V3 (Base)"), "uniswap-v3-base-");
        assert_eq!(chain_key("  Ethereum "), "ethereum");
        assert!(is_same_chain("binance", "BSC"));
    }
}

use ethers::prelude::*;

abigen!(
    IGaugeController,
    r#"[
        function gauges(uint256 i) external view returns (address)
    ]"#
);

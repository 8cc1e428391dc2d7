use ethers::prelude::*;

abigen!(
    ICurveRegistry,
    r#"[
        function pool_count() external view returns (uint256)
        function pool_list(uint256) external view returns (address)
        function gauge_controller() external view returns (address)
        function get_balances(address) external view returns (uint256[8])
        function get_coins(address) external view returns (address[8])
        function get_underlying_coins(address) external view returns (address[8])
        function is_meta(address) external view returns (bool)
        function get_lp_token(address) external view returns (address)
        function get_pool_from_lp_token(address) external view returns (address)
    ]"#
);

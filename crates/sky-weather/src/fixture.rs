//! Built-in sample feed, served instead of the network when
//! `feed.use_embedded_fixture` is set.

/// A four-day forecast in the webservice's reply format
pub const EXAMPLE_RESPONSE: &str = r#"<?xml version="1.0"?>
<xml_api_reply version="1">
  <weather module_id="0" tab_id="0" mobile_row="0" mobile_zipped="1" row="0" section="0">
    <forecast_information>
      <city data="Mountain View, CA"/>
      <postal_code data=""/>
      <latitude_e6 data="37386052"/>
      <longitude_e6 data="-122083851"/>
      <forecast_date data="2009-04-30"/>
      <current_date_time data="2009-04-30 21:30:00 +0000"/>
      <unit_system data="SI"/>
    </forecast_information>
    <moreWeatherInformation>http://www.google.com/search?q=weather+mountain+view</moreWeatherInformation>
    <current_conditions>
      <condition data="Clear"/>
      <temp_f data="54"/>
      <temp_c data="12"/>
      <humidity data="Humidity: 72%"/>
      <icon data="/ig/images/weather/sunny.gif"/>
      <wind_condition data="Wind: W at 9 mph"/>
    </current_conditions>
    <forecast_conditions>
      <day_of_week data="Thu"/>
      <low data="9"/>
      <high data="19"/>
      <icon data="/ig/images/weather/mostly_sunny.gif"/>
      <condition data="Mostly Sunny"/>
    </forecast_conditions>
    <forecast_conditions>
      <day_of_week data="Fri"/>
      <low data="10"/>
      <high data="21"/>
      <icon data="/ig/images/weather/partly_cloudy.gif"/>
      <condition data="Partly Cloudy"/>
    </forecast_conditions>
    <forecast_conditions>
      <day_of_week data="Sat"/>
      <low data="8"/>
      <high data="16"/>
      <icon data="/ig/images/weather/chance_of_rain.gif"/>
      <condition data="Chance of Rain"/>
    </forecast_conditions>
    <forecast_conditions>
      <day_of_week data="Sun"/>
      <low data="7"/>
      <high data="15"/>
      <icon data="/ig/images/weather/rain.gif"/>
      <condition data="Rain"/>
    </forecast_conditions>
  </weather>
</xml_api_reply>
"#;
